//! Per-key merge policy.
//!
//! Two predicates govern how a source is applied to a configuration:
//!
//! - the **key filter** drops keys for which it returns false;
//! - the **merge keys** decide whether a mapping value is merged recursively
//!   into an existing mapping at the same key, or replaces it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::value::{Configuration, is_reserved_key};

/// Predicate over top-level configuration keys.
pub type KeyPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Which top-level keys are merged instead of replaced.
#[derive(Clone, Default)]
pub enum MergeKeys {
    /// Every key is replaced wholesale.
    #[default]
    Never,
    /// Every key holding a mapping is merged.
    Always,
    /// Only the listed keys are merged.
    Keys(BTreeSet<String>),
    /// Keys accepted by the predicate are merged.
    Custom(KeyPredicate),
}

impl MergeKeys {
    /// Merges only the given keys.
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Keys(keys.into_iter().map(Into::into).collect())
    }

    /// Merges keys accepted by `predicate`.
    pub fn custom(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    /// Returns true if values at `key` are merged.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::Keys(keys) => keys.contains(key),
            Self::Custom(predicate) => predicate(key),
        }
    }
}

impl From<bool> for MergeKeys {
    fn from(merge: bool) -> Self {
        if merge { Self::Always } else { Self::Never }
    }
}

impl fmt::Debug for MergeKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("Never"),
            Self::Always => f.write_str("Always"),
            Self::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Key filter and merge keys applied to every configuration source.
#[derive(Clone, Default)]
pub struct MergePolicy {
    key_filter: Option<KeyPredicate>,
    merge_keys: MergeKeys,
}

impl MergePolicy {
    /// Creates the default policy: accept every key, never merge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key filter. `None` accepts every key.
    #[must_use]
    pub fn with_key_filter(mut self, filter: Option<KeyPredicate>) -> Self {
        self.key_filter = filter;
        self
    }

    /// Sets the merge keys.
    #[must_use]
    pub fn with_merge_keys(mut self, merge_keys: impl Into<MergeKeys>) -> Self {
        self.merge_keys = merge_keys.into();
        self
    }

    /// Replaces the key filter in place.
    pub fn set_key_filter(&mut self, filter: Option<KeyPredicate>) {
        self.key_filter = filter;
    }

    /// Replaces the merge keys in place.
    pub fn set_merge_keys(&mut self, merge_keys: impl Into<MergeKeys>) {
        self.merge_keys = merge_keys.into();
    }

    /// Returns the merge keys.
    #[must_use]
    pub const fn merge_keys(&self) -> &MergeKeys {
        &self.merge_keys
    }

    /// Returns true if `key` survives the key filter.
    #[must_use]
    pub fn accepts(&self, key: &str) -> bool {
        !is_reserved_key(key) && self.key_filter.as_ref().is_none_or(|filter| filter(key))
    }

    /// Returns true if values at `key` are merged recursively.
    #[must_use]
    pub fn merges(&self, key: &str) -> bool {
        self.merge_keys.contains(key)
    }

    /// Applies `source` on top of `config`.
    pub fn apply(&self, config: &mut Configuration, source: Map<String, Value>) {
        let target = config.as_map_mut();

        for (key, value) in source {
            if !self.accepts(&key) {
                tracing::trace!(key = %key, "configuration key filtered out");
                continue;
            }

            if self.merges(&key) && value.is_object() {
                if let Some(Value::Object(existing)) = target.get_mut(&key) {
                    if let Value::Object(incoming) = value {
                        merge_maps(existing, incoming);
                    }
                    continue;
                }
            }

            target.insert(key, value);
        }
    }
}

impl fmt::Debug for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergePolicy")
            .field("key_filter", &self.key_filter.as_ref().map(|_| ".."))
            .field("merge_keys", &self.merge_keys)
            .finish()
    }
}

/// Merges `source` into `into` depth-first. Leaves in `source` win.
pub fn merge_maps(into: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        if let Value::Object(incoming) = value {
            if let Some(Value::Object(existing)) = into.get_mut(&key) {
                merge_maps(existing, incoming);
                continue;
            }
            into.insert(key, Value::Object(incoming));
        } else {
            into.insert(key, value);
        }
    }
}

/// Removes from a copy of `config` every entry equal to its default.
///
/// Keys that `policy` merges are compared recursively, so only the nested
/// entries that differ from `defaults` are kept. The result holds exactly the
/// deltas a user would have to write to reproduce `config` on top of
/// `defaults`.
#[must_use]
pub fn minimize(config: &Configuration, defaults: &Configuration, policy: &MergePolicy) -> Configuration {
    let mut result = Map::new();

    for (key, value) in config.iter() {
        let Some(default) = defaults.get(key) else {
            result.insert(key.clone(), value.clone());
            continue;
        };

        if policy.merges(key) {
            if let (Value::Object(current), Value::Object(default)) = (value, default) {
                let pruned = minimize_maps(current, default);
                if !pruned.is_empty() {
                    result.insert(key.clone(), Value::Object(pruned));
                }
                continue;
            }
        }

        if value != default {
            result.insert(key.clone(), value.clone());
        }
    }

    Configuration::from_map(result)
}

fn minimize_maps(current: &Map<String, Value>, default: &Map<String, Value>) -> Map<String, Value> {
    let mut result = Map::new();

    for (key, value) in current {
        match (value, default.get(key)) {
            (Value::Object(nested), Some(Value::Object(nested_default))) => {
                let pruned = minimize_maps(nested, nested_default);
                if !pruned.is_empty() {
                    result.insert(key.clone(), Value::Object(pruned));
                }
            }
            (value, Some(default)) if value == default => {}
            (value, _) => {
                result.insert(key.clone(), value.clone());
            }
        }
    }

    result
}

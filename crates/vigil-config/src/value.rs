//! The configuration object.
//!
//! A [`Configuration`] is an ordered mapping from top-level keys to
//! [`Value`]s. Each top-level key is an independent namespace; nested
//! mappings are ordinary [`Value::Object`]s.

use serde::{Deserialize, Serialize};

pub use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};
use crate::format::ConfigFormat;

/// Prefix reserved for internal bookkeeping. Keys starting with it never
/// enter a configuration.
pub const RESERVED_PREFIX: &str = "__";

/// Returns true if `key` uses the reserved prefix.
#[must_use]
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Ordered mapping holding the configuration of an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(Map<String, Value>);

impl Configuration {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps an existing mapping. Reserved keys are dropped.
    #[must_use]
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        map.retain(|key, _| !is_reserved_key(key));
        Self(map)
    }

    /// Parses a TOML document into a configuration.
    ///
    /// Intended for base defaults embedded with `include_str!`.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        ConfigFormat::Toml
            .parse(text, "<defaults>")
            .map(Self::from_map)
    }

    /// Parses a JSON document into a configuration.
    pub fn from_json_str(text: &str) -> Result<Self> {
        ConfigFormat::Json
            .parse(text, "<defaults>")
            .map(Self::from_map)
    }

    /// Returns the value at a top-level key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a mutable reference to the value at a top-level key.
    ///
    /// Only nested structures may be mutated at runtime; top-level identity
    /// is fixed once the application is prepared.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    /// Returns the value at `key` if it is a boolean.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Returns the value at `key` if it is a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns the value at `key` if it is an integer.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    /// Returns the mapping at `key` if the value is a mapping.
    #[must_use]
    pub fn get_map(&self, key: &str) -> Option<&Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object)
    }

    /// Returns true if the value at `key` exists and is truthy.
    #[must_use]
    pub fn is_truthy(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(is_truthy)
    }

    /// Inserts a value, returning the previous one.
    ///
    /// # Errors
    /// Returns an error if `key` uses the reserved prefix.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Option<Value>> {
        let key = key.into();
        if is_reserved_key(&key) {
            return Err(ConfigError::ReservedKey { key });
        }
        Ok(self.0.insert(key, value.into()))
    }

    /// Removes a top-level key.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of top-level keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the top-level keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Iterates over the top-level entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrows the underlying mapping.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub(crate) fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Consumes the configuration, returning the underlying mapping.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Returns the configuration as a single [`Value::Object`].
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Configuration> for Value {
    fn from(config: Configuration) -> Self {
        Self::Object(config.0)
    }
}

impl FromIterator<(String, Value)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

/// Truthiness of a configuration value.
///
/// `null`, `false`, zero, and empty strings, lists or mappings are falsy;
/// everything else is truthy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_map_drops_reserved_keys() {
        let Value::Object(map) = json!({"__internal": 1, "PORT": 5000}) else {
            unreachable!()
        };
        let config = Configuration::from_map(map);
        assert_eq!(config.len(), 1);
        assert_eq!(config.get_i64("PORT"), Some(5000));
    }

    #[test]
    fn test_insert_rejects_reserved_key() {
        let mut config = Configuration::new();
        assert!(config.insert("__name__", 1).is_err());
        assert!(config.insert("NAME", "vigil").is_ok());
        assert_eq!(config.get_str("NAME"), Some("vigil"));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!({"a": 1})));
    }

    #[test]
    fn test_preserves_insertion_order() {
        let mut config = Configuration::new();
        config.insert("ZETA", 1).unwrap();
        config.insert("ALPHA", 2).unwrap();
        config.insert("MID", 3).unwrap();
        let keys: Vec<&str> = config.keys().map(String::as_str).collect();
        assert_eq!(keys, ["ZETA", "ALPHA", "MID"]);
    }

    #[test]
    fn test_from_toml_str() {
        let config = Configuration::from_toml_str("DEBUG = true\n[EXTENSIONS.http]\nport = 8000\n").unwrap();
        assert_eq!(config.get_bool("DEBUG"), Some(true));
        assert_eq!(
            config.get("EXTENSIONS"),
            Some(&json!({"http": {"port": 8000}}))
        );
    }

    #[test]
    fn test_remove_keeps_order() {
        let config: Configuration = [
            ("A".to_string(), json!(1)),
            ("B".to_string(), json!(2)),
            ("C".to_string(), json!(3)),
        ]
        .into_iter()
        .collect();
        let mut config = config;
        config.remove("B");
        let keys: Vec<&str> = config.keys().map(String::as_str).collect();
        assert_eq!(keys, ["A", "C"]);
    }
}

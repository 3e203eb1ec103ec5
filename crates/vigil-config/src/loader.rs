//! Layered configuration loading.
//!
//! Sources are applied in a fixed order, each as a merge pass over the
//! previous result:
//!
//! 1. base defaults (optional);
//! 2. the explicit file (mandatory), or else the first default file that
//!    exists in the search directory (optional);
//! 3. the file named by the environment variable, when it is set (mandatory).
//!
//! A missing mandatory file is a soft failure: it is logged, loading goes on,
//! and [`ConfigLoader::load`] returns `false`.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ConfigError, Result};
use crate::format::ConfigFormat;
use crate::merge::{KeyPredicate, MergeKeys, MergePolicy, minimize};
use crate::value::Configuration;

/// Resolves environment variables by name.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Record of a parsed configuration file.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    /// Path the file was loaded from.
    pub name: PathBuf,
    /// Detected format.
    pub format: ConfigFormat,
    /// Configuration as it was right before this file was applied.
    pub snapshot: Configuration,
}

/// Merges layered sources into one [`Configuration`].
pub struct ConfigLoader {
    config: Configuration,
    base: Option<Configuration>,
    default_filenames: Vec<PathBuf>,
    search_dir: Option<PathBuf>,
    environment_variable: Option<String>,
    env_lookup: EnvLookup,
    policy: MergePolicy,
    safe_mode: bool,
    loaded_files: Vec<LoadedFile>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader with no sources, reading the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Configuration::new(),
            base: None,
            default_filenames: Vec::new(),
            search_dir: None,
            environment_variable: None,
            env_lookup: Arc::new(|name| std::env::var(name).ok()),
            policy: MergePolicy::new(),
            safe_mode: false,
            loaded_files: Vec::new(),
        }
    }

    /// Sets the base defaults applied before any file.
    #[must_use]
    pub fn with_base(mut self, base: Configuration) -> Self {
        self.base = Some(base);
        self
    }

    /// Sets the default filenames, tried in order.
    #[must_use]
    pub fn with_default_filenames<I, P>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.default_filenames = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the directory default filenames are resolved against.
    #[must_use]
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = Some(dir.into());
        self
    }

    /// Sets the environment variable naming an override file.
    #[must_use]
    pub fn with_environment_variable(mut self, name: impl Into<String>) -> Self {
        self.environment_variable = Some(name.into());
        self
    }

    /// Replaces the environment lookup.
    #[must_use]
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env_lookup = Arc::new(lookup);
        self
    }

    /// Sets the key filter.
    #[must_use]
    pub fn with_key_filter(mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        let filter: KeyPredicate = Arc::new(filter);
        self.policy.set_key_filter(Some(filter));
        self
    }

    /// Sets which keys are merged instead of replaced.
    #[must_use]
    pub fn with_merge_keys(mut self, merge_keys: impl Into<MergeKeys>) -> Self {
        self.policy.set_merge_keys(merge_keys);
        self
    }

    /// Enables or disables safe mode.
    #[must_use]
    pub fn with_safe_mode(mut self, safe_mode: bool) -> Self {
        self.safe_mode = safe_mode;
        self
    }

    /// Mutable access to the merge policy.
    pub fn policy_mut(&mut self) -> &mut MergePolicy {
        &mut self.policy
    }

    /// Returns the merge policy.
    #[must_use]
    pub const fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    /// Changes the search directory in place.
    pub fn set_search_dir(&mut self, dir: impl Into<PathBuf>) {
        self.search_dir = Some(dir.into());
    }

    /// Changes the environment lookup in place.
    pub fn set_env_lookup(&mut self, lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) {
        self.env_lookup = Arc::new(lookup);
    }

    /// Reads an environment variable through the configured lookup.
    #[must_use]
    pub fn env_var(&self, name: &str) -> Option<String> {
        (self.env_lookup)(name)
    }

    /// Changes safe mode in place.
    pub fn set_safe_mode(&mut self, safe_mode: bool) {
        self.safe_mode = safe_mode;
    }

    /// Returns true if the script format is refused.
    #[must_use]
    pub const fn safe_mode(&self) -> bool {
        self.safe_mode
    }

    /// Returns the environment variable naming an override file.
    #[must_use]
    pub fn environment_variable(&self) -> Option<&str> {
        self.environment_variable.as_deref()
    }

    /// Returns the default filenames.
    #[must_use]
    pub fn default_filenames(&self) -> &[PathBuf] {
        &self.default_filenames
    }

    /// Loads every source into the configuration.
    ///
    /// Returns `Ok(false)` if a mandatory file was missing.
    ///
    /// # Errors
    /// Returns an error if a file cannot be read for any other reason, if its
    /// format is unsupported, or if it is malformed.
    pub fn load(&mut self, explicit: Option<&Path>) -> Result<bool> {
        if let Some(base) = &self.base {
            self.policy.apply(&mut self.config, base.clone().into_map());
        }

        let mut success = true;

        match explicit {
            Some(path) => success &= self.load_file(path, true)?,
            None => {
                if let Some(path) = self.first_default_file() {
                    self.load_file(&path, false)?;
                }
            }
        }

        let from_env = self
            .environment_variable
            .as_deref()
            .and_then(|name| (self.env_lookup)(name))
            .filter(|value| !value.is_empty());
        if let Some(path) = from_env {
            success &= self.load_file(Path::new(&path), true)?;
        }

        Ok(success)
    }

    fn first_default_file(&self) -> Option<PathBuf> {
        let dir = self.search_dir.clone().unwrap_or_default();
        self.default_filenames
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    fn load_file(&mut self, path: &Path, mandatory: bool) -> Result<bool> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if is_missing(&err) => {
                if mandatory {
                    tracing::warn!(file = %path.display(), "configuration file does not exist");
                    return Ok(false);
                }
                return Ok(true);
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let format = ConfigFormat::detect(path, self.safe_mode)?;
        let source = format.parse(&text, path)?;

        self.loaded_files.push(LoadedFile {
            name: path.to_path_buf(),
            format,
            snapshot: self.config.clone(),
        });
        self.policy.apply(&mut self.config, source);

        tracing::info!(file = %path.display(), %format, "loaded configuration");
        Ok(true)
    }

    /// Returns the configuration loaded so far.
    #[must_use]
    pub const fn result(&self) -> &Configuration {
        &self.config
    }

    /// Consumes the loader, returning the configuration.
    #[must_use]
    pub fn into_result(self) -> Configuration {
        self.config
    }

    /// Files parsed so far, in load order.
    #[must_use]
    pub fn loaded_files(&self) -> &[LoadedFile] {
        &self.loaded_files
    }

    /// Returns what the file at `index` changed in the configuration, pruned
    /// of unchanged entries.
    #[must_use]
    pub fn changes_introduced_by(&self, index: usize) -> Option<Configuration> {
        let before = &self.loaded_files.get(index)?.snapshot;
        let after = self
            .loaded_files
            .get(index + 1)
            .map_or(&self.config, |next| &next.snapshot);
        Some(minimize(after, before, &self.policy))
    }
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("default_filenames", &self.default_filenames)
            .field("search_dir", &self.search_dir)
            .field("environment_variable", &self.environment_variable)
            .field("policy", &self.policy)
            .field("safe_mode", &self.safe_mode)
            .field("loaded_files", &self.loaded_files.len())
            .finish_non_exhaustive()
    }
}

fn is_missing(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::NotFound | ErrorKind::IsADirectory | ErrorKind::NotADirectory
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn env(vars: &[(&str, PathBuf)]) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.display().to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn base() -> Configuration {
        Configuration::from_json_str(r#"{"PORT": 5000, "EXTENSIONS": {"http": {"port": 80}}}"#).unwrap()
    }

    #[test]
    fn test_base_only() {
        let dir = TempDir::new().unwrap();
        let mut loader = ConfigLoader::new()
            .with_base(base())
            .with_search_dir(dir.path())
            .with_default_filenames(["app.json"])
            .with_env_lookup(|_| None);
        assert!(loader.load(None).unwrap());
        assert_eq!(loader.result(), &base());
        assert!(loader.loaded_files().is_empty());
    }

    #[test]
    fn test_first_existing_default_file_wins() {
        let dir = TempDir::new().unwrap();
        write(&dir, "app.json", r#"{"PORT": 1}"#);
        write(&dir, "app.toml", "PORT = 2\n");
        let mut loader = ConfigLoader::new()
            .with_search_dir(dir.path())
            .with_default_filenames(["app.jsonc", "app.json", "app.toml"])
            .with_env_lookup(|_| None);
        assert!(loader.load(None).unwrap());
        assert_eq!(loader.result().get_i64("PORT"), Some(1));
        assert_eq!(loader.loaded_files().len(), 1);
        assert_eq!(loader.loaded_files()[0].format, ConfigFormat::Json);
    }

    #[test]
    fn test_missing_explicit_file_is_soft_failure() {
        let dir = TempDir::new().unwrap();
        let mut loader = ConfigLoader::new()
            .with_base(base())
            .with_env_lookup(|_| None);
        let ok = loader.load(Some(&dir.path().join("nope.json"))).unwrap();
        assert!(!ok);
        assert_eq!(loader.result(), &base());
    }

    #[test]
    fn test_explicit_file_skips_defaults() {
        let dir = TempDir::new().unwrap();
        write(&dir, "app.json", r#"{"FROM_DEFAULT": true}"#);
        let explicit = write(&dir, "other.json5", "{ FROM_EXPLICIT: true }");
        let mut loader = ConfigLoader::new()
            .with_search_dir(dir.path())
            .with_default_filenames(["app.json"])
            .with_env_lookup(|_| None);
        assert!(loader.load(Some(&explicit)).unwrap());
        assert!(!loader.result().contains_key("FROM_DEFAULT"));
        assert_eq!(loader.result().get_bool("FROM_EXPLICIT"), Some(true));
    }

    #[test]
    fn test_missing_env_file_is_soft_failure_but_loading_continues() {
        let dir = TempDir::new().unwrap();
        let explicit = write(&dir, "app.json", r#"{"PORT": 6000}"#);
        let mut loader = ConfigLoader::new()
            .with_environment_variable("APP_SETTINGS")
            .with_env_lookup(env(&[("APP_SETTINGS", dir.path().join("missing.toml"))]));
        assert!(!loader.load(Some(&explicit)).unwrap());
        assert_eq!(loader.result().get_i64("PORT"), Some(6000));
    }

    #[test]
    fn test_env_file_applied_last() {
        let dir = TempDir::new().unwrap();
        write(&dir, "app.json", r#"{"PORT": 6000, "HOST": "a"}"#);
        let env_file = write(&dir, "prod.toml", "PORT = 7000\n");
        let mut loader = ConfigLoader::new()
            .with_base(base())
            .with_search_dir(dir.path())
            .with_default_filenames(["app.json"])
            .with_environment_variable("APP_SETTINGS")
            .with_env_lookup(env(&[("APP_SETTINGS", env_file)]));
        assert!(loader.load(None).unwrap());
        assert_eq!(loader.result().get_i64("PORT"), Some(7000));
        assert_eq!(loader.result().get_str("HOST"), Some("a"));
        assert_eq!(loader.loaded_files().len(), 2);
    }

    #[test]
    fn test_directory_as_mandatory_file_is_soft_failure() {
        let dir = TempDir::new().unwrap();
        let mut loader = ConfigLoader::new().with_env_lookup(|_| None);
        assert!(!loader.load(Some(dir.path())).unwrap());
    }

    #[test]
    fn test_malformed_file_is_hard_error() {
        let dir = TempDir::new().unwrap();
        let bad = write(&dir, "bad.json", "{ not json");
        let mut loader = ConfigLoader::new().with_env_lookup(|_| None);
        let err = loader.load(Some(&bad)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_script_refused_in_safe_mode() {
        let dir = TempDir::new().unwrap();
        let script = write(&dir, "app.cfg", "PORT = 1\n");
        let mut loader = ConfigLoader::new()
            .with_safe_mode(true)
            .with_env_lookup(|_| None);
        let err = loader.load(Some(&script)).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));

        let mut loader = ConfigLoader::new().with_env_lookup(|_| None);
        assert!(loader.load(Some(&script)).unwrap());
        assert_eq!(loader.result().get_i64("PORT"), Some(1));
    }

    #[test]
    fn test_merge_keys_and_key_filter_apply_to_files() {
        let dir = TempDir::new().unwrap();
        let file = write(
            &dir,
            "app.jsonc",
            r#"{
                // extension overrides
                "EXTENSIONS": {"http": {"host": "0.0.0.0"}},
                "lowercase": 1
            }"#,
        );
        let mut loader = ConfigLoader::new()
            .with_base(base())
            .with_merge_keys(MergeKeys::keys(["EXTENSIONS"]))
            .with_key_filter(|key| key.chars().all(|c| !c.is_lowercase()))
            .with_env_lookup(|_| None);
        assert!(loader.load(Some(&file)).unwrap());
        assert_eq!(
            loader.result().get("EXTENSIONS"),
            Some(&json!({"http": {"port": 80, "host": "0.0.0.0"}}))
        );
        assert!(!loader.result().contains_key("lowercase"));
    }

    #[test]
    fn test_changes_introduced_by_file() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "app.json", r#"{"PORT": 5000, "EXTENSIONS": {"http": {"port": 8080}}}"#);
        let mut loader = ConfigLoader::new()
            .with_base(base())
            .with_merge_keys(true)
            .with_env_lookup(|_| None);
        assert!(loader.load(Some(&file)).unwrap());
        assert_eq!(loader.loaded_files()[0].snapshot, base());
        let changes = loader.changes_introduced_by(0).unwrap();
        assert_eq!(changes.to_value(), json!({"EXTENSIONS": {"http": {"port": 8080}}}));
        assert!(loader.changes_introduced_by(1).is_none());
    }

    #[test]
    fn test_changes_introduced_by_each_file() {
        let dir = TempDir::new().unwrap();
        let explicit = write(&dir, "a.json", r#"{"PORT": 1}"#);
        let env_file = write(&dir, "b.json", r#"{"HOST": "x"}"#);
        let mut loader = ConfigLoader::new()
            .with_environment_variable("APP_SETTINGS")
            .with_env_lookup(env(&[("APP_SETTINGS", env_file)]));
        assert!(loader.load(Some(&explicit)).unwrap());
        assert_eq!(loader.loaded_files().len(), 2);

        let first = loader.changes_introduced_by(0).unwrap();
        assert_eq!(first.to_value(), json!({"PORT": 1}));
        let second = loader.changes_introduced_by(1).unwrap();
        assert_eq!(second.to_value(), json!({"HOST": "x"}));
    }

    #[test]
    fn test_env_var_uses_lookup() {
        let loader = ConfigLoader::new().with_env_lookup(|name| (name == "A").then(|| "1".to_string()));
        assert_eq!(loader.env_var("A").as_deref(), Some("1"));
        assert_eq!(loader.env_var("B"), None);
    }
}

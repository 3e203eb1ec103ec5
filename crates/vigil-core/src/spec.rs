//! Application identity and configuration sources.

use vigil_config::{ConfigLoader, Configuration};

use crate::error::{LifecycleError, Result};
use crate::instruments::{INSTRUMENTS_VARIABLE_SUFFIX, Instruments};

/// Suffix appended to the uppercased application name to form the name of
/// the override environment variable.
pub const ENVIRONMENT_VARIABLE_SUFFIX: &str = "_SETTINGS";

/// Describes an application to the lifecycle controllers.
///
/// # Example
///
/// ```rust,ignore
/// let spec = AppSpec::new("skybrushd")
///     .with_full_name("Skybrush Server")
///     .with_version(env!("CARGO_PKG_VERSION"))
///     .with_defaults(Configuration::from_toml_str(include_str!("defaults.toml"))?);
///
/// assert_eq!(spec.environment_variable(), "SKYBRUSHD_SETTINGS");
/// ```
#[derive(Debug, Clone)]
pub struct AppSpec {
    name: String,
    full_name: Option<String>,
    version: Option<String>,
    defaults: Configuration,
    safe_mode: bool,
    instruments: Instruments,
}

impl AppSpec {
    /// Creates a spec for the application with the given short name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: None,
            version: None,
            defaults: Configuration::new(),
            safe_mode: false,
            instruments: Instruments::new(),
        }
    }

    /// Sets the human-readable name.
    #[must_use]
    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the base defaults.
    #[must_use]
    pub fn with_defaults(mut self, defaults: Configuration) -> Self {
        self.defaults = defaults;
        self
    }

    /// Refuses script configuration files when enabled.
    #[must_use]
    pub const fn with_safe_mode(mut self, safe_mode: bool) -> Self {
        self.safe_mode = safe_mode;
        self
    }

    /// Enables instruments regardless of the environment.
    #[must_use]
    pub const fn with_instruments(mut self, instruments: Instruments) -> Self {
        self.instruments = instruments;
        self
    }

    /// Short name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable name, falling back to the short name.
    #[must_use]
    pub fn full_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.name)
    }

    /// Version, if known.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Base defaults.
    #[must_use]
    pub const fn defaults(&self) -> &Configuration {
        &self.defaults
    }

    /// Whether script configuration is refused.
    #[must_use]
    pub const fn safe_mode(&self) -> bool {
        self.safe_mode
    }

    /// Instruments enabled in code.
    #[must_use]
    pub const fn instruments(&self) -> Instruments {
        self.instruments
    }

    /// Checks that the short name is usable.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.name.is_empty() {
            "must not be empty"
        } else if self.name.chars().any(char::is_whitespace) {
            "must not contain whitespace"
        } else {
            return Ok(());
        };

        Err(LifecycleError::InvalidName {
            name: self.name.clone(),
            reason,
        })
    }

    /// Name of the environment variable pointing at an override file.
    #[must_use]
    pub fn environment_variable(&self) -> String {
        format!("{}{ENVIRONMENT_VARIABLE_SUFFIX}", self.name.to_uppercase())
    }

    /// Name of the environment variable listing extra instruments.
    #[must_use]
    pub fn instruments_variable(&self) -> String {
        format!("{}{INSTRUMENTS_VARIABLE_SUFFIX}", self.name.to_uppercase())
    }

    /// Default configuration filenames, in lookup order.
    #[must_use]
    pub fn default_filenames(&self) -> Vec<String> {
        let extensions: &[&str] = if self.safe_mode {
            &["jsonc", "json", "json5", "toml"]
        } else {
            &["cfg", "jsonc", "json", "json5", "toml"]
        };
        extensions
            .iter()
            .map(|ext| format!("{}.{ext}", self.name))
            .collect()
    }

    /// Builds the configuration loader for this application.
    #[must_use]
    pub fn configurator(&self) -> ConfigLoader {
        ConfigLoader::new()
            .with_base(self.defaults.clone())
            .with_default_filenames(self.default_filenames())
            .with_environment_variable(self.environment_variable())
            .with_safe_mode(self.safe_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_whitespace_and_empty() {
        assert!(AppSpec::new("vigild").validate().is_ok());
        assert!(matches!(
            AppSpec::new("my app").validate(),
            Err(LifecycleError::InvalidName { .. })
        ));
        assert!(AppSpec::new("tab\tname").validate().is_err());
        assert!(AppSpec::new("").validate().is_err());
    }

    #[test]
    fn test_full_name_fallback() {
        assert_eq!(AppSpec::new("vigild").full_name(), "vigild");
        assert_eq!(
            AppSpec::new("vigild").with_full_name("Vigil Daemon").full_name(),
            "Vigil Daemon"
        );
    }

    #[test]
    fn test_environment_variable() {
        assert_eq!(AppSpec::new("myapp").environment_variable(), "MYAPP_SETTINGS");
        assert_eq!(AppSpec::new("myapp").instruments_variable(), "MYAPP_INSTRUMENTS");
    }

    #[test]
    fn test_default_filenames_respect_safe_mode() {
        let spec = AppSpec::new("app");
        assert_eq!(
            spec.default_filenames(),
            ["app.cfg", "app.jsonc", "app.json", "app.json5", "app.toml"]
        );
        let safe = spec.with_safe_mode(true);
        assert_eq!(
            safe.default_filenames(),
            ["app.jsonc", "app.json", "app.json5", "app.toml"]
        );
    }

    #[test]
    fn test_configurator_carries_spec() {
        let loader = AppSpec::new("app").with_safe_mode(true).configurator();
        assert!(loader.safe_mode());
        assert_eq!(loader.environment_variable(), Some("APP_SETTINGS"));
        assert_eq!(loader.default_filenames().len(), 4);
    }
}

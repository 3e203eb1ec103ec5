//! Error types for vigil-config.
//!
//! A missing mandatory file is not an error here: it is reported through the
//! boolean returned by [`crate::ConfigLoader::load`]. Everything below is a
//! hard failure that aborts loading.

use std::path::PathBuf;

use crate::format::ConfigFormat;

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or parsing configuration sources.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error other than "file is missing".
    #[error("cannot read configuration from {path:?}: {source}")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file was read but its content is malformed.
    #[error("malformed {format} configuration in {path:?}: {message}")]
    Parse {
        /// File being parsed (or a synthetic name for in-memory sources).
        path: PathBuf,
        /// Detected format.
        format: ConfigFormat,
        /// Parser message.
        message: String,
    },

    /// No parser is available for the file.
    #[error("unsupported configuration format for {path:?}: {reason}")]
    UnsupportedFormat {
        /// File whose format was rejected.
        path: PathBuf,
        /// Why the format was rejected.
        reason: String,
    },

    /// A key uses the prefix reserved for internal bookkeeping.
    #[error("key {key:?} uses the reserved prefix \"__\"")]
    ReservedKey {
        /// The offending key.
        key: String,
    },
}

impl ConfigError {
    /// Creates a parse error.
    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, format: ConfigFormat, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            format,
            message: message.into(),
        }
    }

    /// Creates an unsupported-format error.
    #[must_use]
    pub fn unsupported(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns the path of the source that caused the error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Io { path, .. } | Self::Parse { path, .. } | Self::UnsupportedFormat { path, .. } => {
                Some(path)
            }
            Self::ReservedKey { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ConfigError::parse("app.json", ConfigFormat::Json, "expected value at line 1");
        assert_eq!(
            err.to_string(),
            "malformed JSON configuration in \"app.json\": expected value at line 1"
        );
    }

    #[test]
    fn test_unsupported_error_path() {
        let err = ConfigError::unsupported("app.cfg", "script configuration is disabled in safe mode");
        assert_eq!(err.path(), Some(std::path::Path::new("app.cfg")));
        assert!(err.to_string().contains("safe mode"));
    }
}

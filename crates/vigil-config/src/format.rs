//! Configuration file formats.
//!
//! The format of a file is resolved from its extension. Structured formats
//! are parsed with safe parsers; everything else falls back to the script
//! format, which is refused in safe mode.

use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{ConfigError, Result};
use crate::script;

/// A configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    /// Strict JSON (`.json`).
    Json,
    /// JSON with `//`, `/* */` and `#` comments (`.jsonc`, `.cjson`).
    Jsonc,
    /// JSON5 (`.json5`).
    Json5,
    /// TOML (`.toml`).
    Toml,
    /// `NAME = value` bindings (any other extension, or none).
    Script,
}

impl ConfigFormat {
    /// Resolves the format of `path` from its extension.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnsupportedFormat`] when the extension is not
    /// a structured format and `safe_mode` forbids the script fallback.
    pub fn detect(path: &Path, safe_mode: bool) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let format = match extension.as_deref() {
            Some("json") => Self::Json,
            Some("jsonc" | "cjson") => Self::Jsonc,
            Some("json5") => Self::Json5,
            Some("toml") => Self::Toml,
            _ => Self::Script,
        };

        if format == Self::Script && safe_mode {
            return Err(ConfigError::unsupported(
                path,
                "script configuration is disabled in safe mode",
            ));
        }

        Ok(format)
    }

    /// Returns true if the format evaluates code-like content.
    #[must_use]
    pub const fn is_script(self) -> bool {
        matches!(self, Self::Script)
    }

    /// Parses `text` into a top-level mapping.
    ///
    /// `path` is only used for error reporting.
    pub fn parse(self, text: &str, path: impl AsRef<Path>) -> Result<Map<String, Value>> {
        let path = path.as_ref();
        let fail = |message: String| ConfigError::parse(path, self, message);

        let value = match self {
            Self::Json => serde_json::from_str::<Value>(text).map_err(|e| fail(e.to_string()))?,
            Self::Jsonc => {
                let mut stripped = String::with_capacity(text.len());
                json_comments::StripComments::new(text.as_bytes())
                    .read_to_string(&mut stripped)
                    .map_err(|e| fail(e.to_string()))?;
                serde_json::from_str::<Value>(&stripped).map_err(|e| fail(e.to_string()))?
            }
            Self::Json5 => json5::from_str::<Value>(text).map_err(|e| fail(e.to_string()))?,
            Self::Toml => {
                let table = text
                    .parse::<toml::Table>()
                    .map_err(|e| fail(e.message().to_string()))?;
                toml_to_value(toml::Value::Table(table))
            }
            Self::Script => return script::evaluate(text).map_err(|e| fail(e.to_string())),
        };

        match value {
            Value::Object(map) => Ok(map),
            other => Err(fail(format!(
                "top-level value must be a mapping, found {}",
                kind_of(&other)
            ))),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "JSON",
            Self::Jsonc => "JSONC",
            Self::Json5 => "JSON5",
            Self::Toml => "TOML",
            Self::Script => "script",
        };
        f.write_str(name)
    }
}

fn toml_to_value(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_value).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_value(value)))
                .collect(),
        ),
    }
}

pub(crate) const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

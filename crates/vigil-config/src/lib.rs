// Tests may unwrap for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # vigil-config
//!
//! Layered configuration loading for the Vigil lifecycle engine.
//!
//! - [`Configuration`]: ordered mapping of top-level keys to values
//! - [`ConfigFormat`]: JSON, JSONC, JSON5, TOML and the script fallback
//! - [`MergePolicy`]: key filter plus per-key recursive merge
//! - [`ConfigLoader`]: base defaults, then a file, then an environment override
//! - [`minimize`]: strips the entries a configuration shares with its defaults
//!
//! ## Example
//!
//! ```rust,ignore
//! use vigil_config::{ConfigLoader, Configuration, MergeKeys};
//!
//! let mut loader = ConfigLoader::new()
//!     .with_base(Configuration::from_toml_str(include_str!("defaults.toml"))?)
//!     .with_default_filenames(["myapp.jsonc", "myapp.toml"])
//!     .with_environment_variable("MYAPP_SETTINGS")
//!     .with_merge_keys(MergeKeys::keys(["EXTENSIONS"]));
//!
//! if !loader.load(None)? {
//!     std::process::exit(1);
//! }
//! let config = loader.into_result();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod format;
pub mod loader;
pub mod merge;
pub mod script;
pub mod value;

pub use error::{ConfigError, Result};
pub use format::ConfigFormat;
pub use loader::{ConfigLoader, EnvLookup, LoadedFile};
pub use merge::{KeyPredicate, MergeKeys, MergePolicy, merge_maps, minimize};
pub use script::ScriptError;
pub use value::{Configuration, Map, RESERVED_PREFIX, Value, is_reserved_key, is_truthy};

//! Logging bootstrap.
//!
//! Installs a `tracing` subscriber writing human-readable lines to stderr.
//! `RUST_LOG` takes precedence; otherwise the application crate logs at
//! `info`, or `debug` in debug mode.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is unset.
#[must_use]
pub fn default_directives(app_name: &str, debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    let target = app_name.replace('-', "_");
    format!("{level},vigil_core={level},vigil_config={level},{target}={level}")
}

/// Installs the global subscriber.
///
/// Returns false if one was already installed, for instance by a test
/// harness or an earlier call.
pub fn init_logging(app_name: &str, debug: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(app_name, debug)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(
            default_directives("my-app", false),
            "info,vigil_core=info,vigil_config=info,my_app=info"
        );
        assert!(default_directives("app", true).starts_with("debug,"));
    }

    #[test]
    fn test_init_logging_only_once() {
        init_logging("app", false);
        assert!(!init_logging("app", true));
    }
}

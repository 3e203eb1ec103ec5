//! Error types for vigil-core.
//!
//! These are failures of the engine itself. Failures of scheduled work are
//! [`crate::TaskError`]s and never surface here.

use vigil_config::ConfigError;

use crate::types::AppState;

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Errors raised by the lifecycle controllers.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The application name is unusable.
    #[error("invalid application name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Operation not allowed in the current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// What was attempted.
        operation: &'static str,
        /// State the controller was in.
        state: AppState,
    },

    /// The application has not been prepared yet.
    #[error("application has not been prepared")]
    NotPrepared,
}

impl LifecycleError {
    /// Creates an invalid-state error.
    #[must_use]
    pub const fn invalid_state(operation: &'static str, state: AppState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Returns true if the error came from configuration loading.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

//! Orderly exit requests and run outcomes.

use std::fmt;

/// Exit code used when an [`ExitSignal`] does not name one.
pub const DEFAULT_EXIT_CODE: u8 = 1;

/// Request to stop the application with a specific process exit code.
///
/// Any task, hook or collaborator may return one (usually as
/// `Err(TaskError::Exit(..))`). The first one observed during a run
/// determines the exit code of [`crate::LifecycleController::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitSignal {
    reason: String,
    exit_code: u8,
}

impl ExitSignal {
    /// Creates an exit request with the default exit code.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            exit_code: DEFAULT_EXIT_CODE,
        }
    }

    /// Sets the exit code.
    #[must_use]
    pub const fn with_code(mut self, exit_code: u8) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Human-readable reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl Default for ExitSignal {
    fn default() -> Self {
        Self::new("")
    }
}

impl fmt::Display for ExitSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            f.write_str("application exit requested")
        } else {
            f.write_str(&self.reason)
        }
    }
}

impl std::error::Error for ExitSignal {}

/// What ended a run.
#[derive(Debug)]
pub enum Termination {
    /// Every task finished on its own.
    Completed,
    /// Shutdown was requested.
    Shutdown,
    /// An interrupt was received.
    Interrupted,
    /// A task or hook asked to exit.
    Exit(ExitSignal),
    /// An unprotected task failed.
    Fault {
        /// Name of the failing task.
        task: String,
        /// The failure.
        error: anyhow::Error,
    },
}

impl Termination {
    /// Exit code of the process for this outcome.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Completed | Self::Shutdown | Self::Interrupted => 0,
            Self::Exit(signal) => signal.exit_code(),
            Self::Fault { .. } => DEFAULT_EXIT_CODE,
        }
    }

    /// Returns true for outcomes that are not errors.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Completed | Self::Shutdown | Self::Interrupted)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("all tasks completed"),
            Self::Shutdown => f.write_str("shutdown requested"),
            Self::Interrupted => f.write_str("interrupted"),
            Self::Exit(signal) => write!(f, "exit requested: {signal}"),
            Self::Fault { task, error } => write!(f, "task {task} failed: {error:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_exit_code() {
        assert_eq!(ExitSignal::new("bye").exit_code(), 1);
        assert_eq!(ExitSignal::new("bye").with_code(3).exit_code(), 3);
    }

    #[test]
    fn test_display_falls_back_when_reason_empty() {
        assert_eq!(ExitSignal::default().to_string(), "application exit requested");
        assert_eq!(ExitSignal::new("disk full").to_string(), "disk full");
    }

    #[test]
    fn test_termination_exit_codes() {
        assert_eq!(Termination::Completed.exit_code(), 0);
        assert_eq!(Termination::Shutdown.exit_code(), 0);
        assert_eq!(Termination::Interrupted.exit_code(), 0);
        assert_eq!(Termination::Exit(ExitSignal::new("x").with_code(7)).exit_code(), 7);
        let fault = Termination::Fault {
            task: "worker".into(),
            error: anyhow::anyhow!("boom"),
        };
        assert_eq!(fault.exit_code(), 1);
        assert!(!fault.is_clean());
        assert_eq!(fault.to_string(), "task worker failed: boom");
    }
}

//! Core types for application lifecycle management.

use serde::{Deserialize, Serialize};

/// Unique identifier of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(uuid::Uuid);

impl TaskId {
    /// Creates a new random task ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application lifecycle state.
///
/// ```text
/// Constructed → Prepared → Running → ShuttingDown → Terminated
///      └────────────────────────────────↑
/// ```
///
/// A run that fails before the task tree exists still goes through
/// `ShuttingDown`, so teardown is observable on every path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AppState {
    /// Created, configuration not loaded yet.
    Constructed,
    /// Configuration loaded and processed.
    Prepared,
    /// Task tree is live.
    Running,
    /// Teardown in progress.
    ShuttingDown,
    /// Teardown finished.
    Terminated,
}

impl AppState {
    /// Returns true once teardown has started.
    #[must_use]
    pub const fn is_shutting_down(&self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Terminated)
    }

    /// Returns true if the state is final.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Constructed => "constructed",
            Self::Prepared => "prepared",
            Self::Running => "running",
            Self::ShuttingDown => "shutting down",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn test_state_order_follows_lifecycle() {
        assert!(AppState::Constructed < AppState::Prepared);
        assert!(AppState::Prepared < AppState::Running);
        assert!(AppState::Running < AppState::ShuttingDown);
        assert!(AppState::ShuttingDown < AppState::Terminated);
    }

    #[test]
    fn test_shutting_down_flags() {
        assert!(!AppState::Running.is_shutting_down());
        assert!(AppState::ShuttingDown.is_shutting_down());
        assert!(AppState::Terminated.is_shutting_down());
        assert!(AppState::Terminated.is_terminal());
        assert!(!AppState::ShuttingDown.is_terminal());
    }

    #[test]
    fn test_state_serialize_roundtrip() {
        for state in [
            AppState::Constructed,
            AppState::Prepared,
            AppState::Running,
            AppState::ShuttingDown,
            AppState::Terminated,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            let back: AppState = serde_json::from_str(&json).unwrap();
            assert_eq!(state, back);
        }
    }
}

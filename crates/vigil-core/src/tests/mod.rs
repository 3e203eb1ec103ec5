//! Lifecycle scenario tests.
//!
//! | Module | Covers |
//! |--------|--------|
//! | `lifecycle` | hook order, preparation, shutdown, teardown |
//! | `supervision` | protected and cancellable tasks, task tree start |
//! | `exit_codes` | termination aggregation and exit codes |
//! | `blocking` | blocking-mode controller |

pub mod supervision;

pub use mocks::{Journal, MockApp, MockBlockingApp, RecordingNotifier};

// Tests may unwrap for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # vigil-core
//!
//! Structured-concurrency lifecycle for long-running applications.
//!
//! - [`LifecycleController`] prepares the configuration, runs every task in
//!   one [`TaskTree`], and tears down exactly once
//! - [`ControllerHandle`] schedules work and requests shutdown from anywhere
//! - [`TaskOptions`] makes a task cancellable, protected, or both
//! - [`ExitSignal`] ends a run with a specific exit code
//! - [`BlockingController`] runs a single blocking `main` with the same states
//!
//! ## Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use vigil_core::{AppHooks, AppSpec, ControllerHandle, LifecycleController, TaskOptions};
//!
//! struct Ticker;
//!
//! #[async_trait]
//! impl AppHooks for Ticker {
//!     fn create_components(&mut self, controller: &ControllerHandle) {
//!         controller.schedule("tick", TaskOptions::new().protected(), |ctx| async move {
//!             while !ctx.is_cancelled() {
//!                 tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!             }
//!             Ok(())
//!         });
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = LifecycleController::new(AppSpec::new("ticker"), Ticker)
//!         .unwrap()
//!         .with_os_signals(true);
//!     std::process::exit(i32::from(app.run().await));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Lock guards are held for short synchronous sections only
#![allow(clippy::significant_drop_tightening)]

pub mod blocking;
pub mod controller;
pub mod error;
pub mod exit;
pub mod hooks;
pub mod instruments;
pub mod notify;
mod shim;
pub mod signals;
pub mod spec;
pub mod stats;
pub mod task;
#[cfg(test)]
pub mod tests;
pub mod tree;
pub mod types;

pub use blocking::{BlockingContext, BlockingController, BlockingHooks};
pub use controller::{ControllerHandle, DEBUG_KEY, LifecycleController};
pub use error::{LifecycleError, Result};
pub use exit::{DEFAULT_EXIT_CODE, ExitSignal, Termination};
pub use hooks::AppHooks;
pub use instruments::{DEFAULT_SLOW_TASK_THRESHOLD, INSTRUMENTS_VARIABLE_SUFFIX, Instruments};
pub use notify::{Notifier, NotifyError, NullNotifier};
pub use signals::{Interrupter, wait_for_shutdown_signal};
pub use spec::{AppSpec, ENVIRONMENT_VARIABLE_SUFFIX};
pub use stats::{StatsSnapshot, TaskOutcome, TaskStatistics};
pub use task::{TaskContext, TaskError, TaskHandle, TaskOptions, TaskResult};
pub use tree::{StartSignal, TaskTree};
pub use types::{AppState, TaskId};

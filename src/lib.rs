// Tests may unwrap for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Vigil: application lifecycle engine for long-running daemons.
//!
//! Layered configuration from [`config`], a structured-concurrency lifecycle
//! from [`core`], and a logging bootstrap in [`logging`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use vigil::prelude::*;
//!
//! struct App;
//!
//! #[async_trait::async_trait]
//! impl AppHooks for App {
//!     fn create_components(&mut self, controller: &ControllerHandle) {
//!         controller.schedule("hello", TaskOptions::new(), |ctx| async move {
//!             tracing::info!(task = ctx.name(), "hello");
//!             Ok(())
//!         });
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     vigil::logging::init_logging("app", false);
//!     let mut app = LifecycleController::new(AppSpec::new("app"), App).unwrap();
//!     std::process::exit(i32::from(app.run().await));
//! }
//! ```

pub use vigil_config as config;
pub use vigil_core as core;

pub mod logging;

/// Prelude module for common imports.
pub mod prelude {
    pub use vigil_config::{ConfigLoader, Configuration, MergeKeys, MergePolicy, Value};
    pub use vigil_core::{
        AppHooks, AppSpec, AppState, BlockingContext, BlockingController, BlockingHooks,
        ControllerHandle, ExitSignal, Instruments, LifecycleController, TaskContext, TaskError, TaskOptions,
        TaskResult, TaskTree,
    };
}

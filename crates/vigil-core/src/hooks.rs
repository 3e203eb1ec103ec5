//! Application hooks.

use async_trait::async_trait;
use vigil_config::{ConfigLoader, Configuration};

use crate::controller::ControllerHandle;
use crate::exit::ExitSignal;
use crate::task::TaskResult;
use crate::tree::TaskTree;

/// Callbacks through which an application plugs into the lifecycle.
///
/// Every method has a no-op default. They are called in this order:
///
/// 1. `create_components` when the controller is built;
/// 2. `setup_configurator` and `process_configuration` during `prepare`;
/// 3. `on_tree_created`, then `ready` during `run`;
/// 4. `teardown` exactly once when `run` ends, whatever the reason.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use vigil_core::{AppHooks, ControllerHandle, TaskOptions};
///
/// struct Server;
///
/// #[async_trait]
/// impl AppHooks for Server {
///     fn create_components(&mut self, controller: &ControllerHandle) {
///         controller.schedule("listener", TaskOptions::new(), |ctx| async move {
///             ctx.cancelled().await;
///             Ok(())
///         });
///     }
/// }
/// ```
#[async_trait]
pub trait AppHooks: Send + 'static {
    /// Creates the components of the application.
    ///
    /// Tasks scheduled here are queued and started once the tree is ready.
    fn create_components(&mut self, _controller: &ControllerHandle) {}

    /// Adjusts the configuration loader before it runs.
    fn setup_configurator(&mut self, _loader: &mut ConfigLoader) {}

    /// Validates or applies the loaded configuration.
    ///
    /// # Errors
    /// Returning an [`ExitSignal`] aborts `prepare` with its exit code.
    async fn process_configuration(
        &mut self,
        _config: &Configuration,
        _controller: &ControllerHandle,
    ) -> Result<(), ExitSignal> {
        Ok(())
    }

    /// Called once the task tree exists, before queued tasks start.
    ///
    /// Tasks spawned or started on `tree` here run before every queued task.
    ///
    /// # Errors
    /// An error stops the run. Failures other than exit requests are turned
    /// into an exit request with code 1.
    async fn on_tree_created(&mut self, _tree: &TaskTree) -> TaskResult {
        Ok(())
    }

    /// Called after queued tasks were started.
    async fn ready(&mut self, _controller: &ControllerHandle) {}

    /// Releases resources. Runs exactly once per `run`.
    async fn teardown(&mut self, _controller: &ControllerHandle) {}
}

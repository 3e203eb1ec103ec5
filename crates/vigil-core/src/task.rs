//! Units of scheduled work.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use vigil_config::Configuration;

use crate::controller::ControllerHandle;
use crate::exit::ExitSignal;
use crate::types::TaskId;

/// Why a unit of work stopped early.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Orderly exit with an exit code.
    #[error(transparent)]
    Exit(#[from] ExitSignal),

    /// User interrupt. Ends the run with code 0.
    #[error("interrupted")]
    Interrupted,

    /// Any other failure.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl TaskError {
    /// Wraps an arbitrary error as a failure.
    pub fn failed<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed(anyhow::Error::new(error))
    }

    /// Returns true for failures that protection may absorb.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl From<std::io::Error> for TaskError {
    fn from(error: std::io::Error) -> Self {
        Self::failed(error)
    }
}

/// Result of a unit of work.
pub type TaskResult = Result<(), TaskError>;

/// How a task is supervised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOptions {
    cancellable: bool,
    protected: bool,
}

impl TaskOptions {
    /// Plain task: no handle, failures end the run.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cancellable: false,
            protected: false,
        }
    }

    /// Returns a [`TaskHandle`] that cancels only this task.
    #[must_use]
    pub const fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    /// Logs failures instead of ending the run.
    ///
    /// Exit requests and interrupts are never absorbed.
    #[must_use]
    pub const fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Whether a handle is returned.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    /// Whether failures are absorbed.
    #[must_use]
    pub const fn is_protected(&self) -> bool {
        self.protected
    }
}

/// Handle cancelling a single task and its subtree.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    name: Arc<str>,
    token: CancellationToken,
}

impl TaskHandle {
    pub(crate) const fn new(id: TaskId, name: Arc<str>, token: CancellationToken) -> Self {
        Self { id, name, token }
    }

    /// Cancels the task. Works before the task has started too.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once `cancel` was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Task ID.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// What a running task knows about itself.
#[derive(Clone)]
pub struct TaskContext {
    id: TaskId,
    name: Arc<str>,
    token: CancellationToken,
    controller: ControllerHandle,
}

impl TaskContext {
    pub(crate) const fn new(
        id: TaskId,
        name: Arc<str>,
        token: CancellationToken,
        controller: ControllerHandle,
    ) -> Self {
        Self {
            id,
            name,
            token,
            controller,
        }
    }

    /// Task ID.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token cancelled when the task or the tree is cancelled.
    ///
    /// Child tokens derived from it form the task's subtree.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// The controller running this task.
    #[must_use]
    pub const fn controller(&self) -> &ControllerHandle {
        &self.controller
    }

    /// The application configuration.
    #[must_use]
    pub fn configuration(&self) -> Arc<Configuration> {
        self.controller.configuration()
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

pub(crate) type BoxedWork = Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, TaskResult> + Send>;

pub(crate) fn boxed<F, Fut>(work: F) -> BoxedWork
where
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    Box::new(move |ctx| Box::pin(work(ctx)))
}

/// Work accepted by the scheduler but not started yet.
pub(crate) struct PendingTask {
    pub(crate) id: TaskId,
    pub(crate) name: Arc<str>,
    pub(crate) options: TaskOptions,
    /// Present for cancellable tasks; shared with their [`TaskHandle`].
    pub(crate) handle_token: Option<CancellationToken>,
    pub(crate) work: BoxedWork,
}

impl PendingTask {
    pub(crate) fn new(name: &str, options: TaskOptions, work: BoxedWork) -> (Self, Option<TaskHandle>) {
        let id = TaskId::new();
        let name: Arc<str> = Arc::from(name);
        let handle_token = options.is_cancellable().then(CancellationToken::new);
        let handle = handle_token
            .as_ref()
            .map(|token| TaskHandle::new(id, Arc::clone(&name), token.clone()));

        let task = Self {
            id,
            name,
            options,
            handle_token,
            work,
        };
        (task, handle)
    }
}

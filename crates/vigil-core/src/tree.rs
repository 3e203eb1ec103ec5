//! The task tree: one cancellation scope holding every task of a run.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::controller::ControllerHandle;
use crate::shim::{self, StartGate};
use crate::task::{self, PendingTask, TaskContext, TaskError, TaskHandle, TaskOptions, TaskResult};

/// Scope owning all tasks of a run.
///
/// Cancelling the tree cancels every task in it. The run ends once the tree
/// is closed and its last task has finished. Tasks start in the order they
/// were spawned, on any runtime flavor.
#[derive(Clone)]
pub struct TaskTree {
    token: CancellationToken,
    tracker: TaskTracker,
    runtime: Handle,
    controller: ControllerHandle,
    /// Fires once the most recently spawned task made its first step.
    last_start: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
}

/// Lets a task started with [`TaskTree::start`] report that it is up.
#[derive(Debug)]
pub struct StartSignal {
    tx: oneshot::Sender<()>,
}

impl StartSignal {
    /// Reports that the task has started.
    pub fn started(self) {
        // The starter may have given up waiting; nothing to do then.
        let _ = self.tx.send(());
    }
}

impl TaskTree {
    /// Must be called from within a Tokio runtime.
    pub(crate) fn new(controller: ControllerHandle) -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            runtime: Handle::current(),
            controller,
            last_start: Arc::new(Mutex::new(None)),
        }
    }

    /// Starts `work` in the tree right away.
    ///
    /// Returns a handle when `options` is cancellable.
    pub fn spawn<F, Fut>(&self, name: &str, options: TaskOptions, work: F) -> Option<TaskHandle>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let (task, handle) = PendingTask::new(name, options, task::boxed(work));
        self.controller.statistics().record_scheduled();
        self.spawn_pending(task);
        handle
    }

    /// Starts `work` and waits until it calls [`StartSignal::started`].
    ///
    /// # Errors
    /// Fails if the task ends, or is cancelled, before reporting.
    pub async fn start<F, Fut>(&self, name: &str, options: TaskOptions, work: F) -> Result<Option<TaskHandle>, TaskError>
    where
        F: FnOnce(TaskContext, StartSignal) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let signal = StartSignal { tx };
        let handle = self.spawn(name, options, move |ctx| work(ctx, signal));

        match rx.await {
            Ok(()) => Ok(handle),
            Err(_) => Err(TaskError::Failed(anyhow::anyhow!(
                "task {name} ended before it reported being started"
            ))),
        }
    }

    pub(crate) fn spawn_pending(&self, task: PendingTask) {
        let (started, rx) = oneshot::channel();
        let mut last_start = self.last_start.lock();
        let gate = StartGate {
            after: last_start.replace(rx),
            started,
        };
        self.tracker
            .spawn_on(shim::supervise(self.clone(), task, gate), &self.runtime);
    }

    /// Cancels every task in the tree.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once the tree was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Root cancellation token. Task tokens are its children.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Number of tasks still alive.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    /// Returns true if no task is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// The controller owning the tree.
    #[must_use]
    pub const fn controller(&self) -> &ControllerHandle {
        &self.controller
    }

    pub(crate) fn close(&self) {
        self.tracker.close();
    }

    pub(crate) async fn wait(&self) {
        self.tracker.wait().await;
    }
}

impl std::fmt::Debug for TaskTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTree")
            .field("tasks", &self.tracker.len())
            .field("closed", &self.tracker.is_closed())
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

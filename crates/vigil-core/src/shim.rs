//! Per-task supervision.
//!
//! Every scheduled unit of work runs inside [`supervise`], which adds the
//! behaviors requested by its [`TaskOptions`](crate::TaskOptions):
//!
//! - **cancellable**: the task also stops when its own handle is cancelled;
//! - **protected**: a failure is logged with the task name and absorbed.
//!
//! Exit requests and interrupts always propagate. Anything that propagates is
//! recorded as the run's [`Termination`] (first one wins) and cancels the
//! whole tree.
//!
//! A task takes its first step only after the task spawned before it did, so
//! queued tasks start in FIFO order on multi-threaded runtimes as well.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::exit::Termination;
use crate::stats::TaskOutcome;
use crate::task::{PendingTask, TaskContext, TaskError, TaskResult};
use crate::tree::TaskTree;

/// Orders task starts: wait for `after`, then report the first step on `started`.
pub(crate) struct StartGate {
    pub(crate) after: Option<oneshot::Receiver<()>>,
    pub(crate) started: oneshot::Sender<()>,
}

pub(crate) async fn supervise(tree: TaskTree, task: PendingTask, gate: StartGate) {
    let StartGate { after, started } = gate;
    if let Some(after) = after {
        // Err: the previous task ended without taking a step.
        let _ = after.await;
    }

    let PendingTask {
        id,
        name,
        options,
        handle_token,
        work,
    } = task;

    let controller = tree.controller().clone();
    let stats = controller.statistics();
    let token = tree.token().child_token();

    if token.is_cancelled() || handle_token.as_ref().is_some_and(CancellationToken::is_cancelled) {
        tracing::debug!(task = %name, "task cancelled before it started");
        return;
    }

    let ctx = TaskContext::new(id, Arc::clone(&name), token.clone(), controller.clone());
    let started_at = stats.record_started();
    tracing::trace!(task = %name, id = %id, "task started");

    let step = Step {
        name: Arc::clone(&name),
        slow_threshold: controller.instruments().slow_task_threshold(),
        stats: stats.clone(),
        started: Some(started),
    };
    // Calling `work` inside the future keeps a panicking constructor catchable.
    let work = AssertUnwindSafe(async move { step.drive(work(ctx)).await }).catch_unwind();

    let result: Option<TaskResult> = tokio::select! {
        biased;
        () = token.cancelled() => None,
        () = handle_cancelled(handle_token.as_ref()) => {
            token.cancel();
            None
        }
        result = work => Some(result.unwrap_or_else(|panic| {
            Err(TaskError::Failed(anyhow::anyhow!("panicked: {}", panic_message(&*panic))))
        })),
    };

    let Some(result) = result else {
        stats.record_finished(started_at, TaskOutcome::Cancelled);
        tracing::debug!(task = %name, "task cancelled");
        return;
    };

    match result {
        Ok(()) => {
            stats.record_finished(started_at, TaskOutcome::Completed);
            tracing::trace!(task = %name, "task finished");
        }
        Err(TaskError::Failed(error)) if options.is_protected() => {
            stats.record_finished(started_at, TaskOutcome::Faulted);
            tracing::error!(task = %name, error = format!("{error:#}"), "protected task failed");
        }
        Err(error) => {
            let outcome = if error.is_failure() {
                TaskOutcome::Faulted
            } else {
                TaskOutcome::Completed
            };
            stats.record_finished(started_at, outcome);
            controller.record_termination(termination_of(&name, error));
            tree.cancel();
        }
    }
}

/// Watches every poll of a task's future.
struct Step {
    name: Arc<str>,
    slow_threshold: Option<Duration>,
    stats: crate::stats::TaskStatistics,
    started: Option<oneshot::Sender<()>>,
}

impl Step {
    async fn drive(mut self, mut work: BoxFuture<'static, TaskResult>) -> TaskResult {
        std::future::poll_fn(move |cx| {
            let began = self.slow_threshold.map(|_| Instant::now());
            let poll = work.as_mut().poll(cx);
            if let Some(started) = self.started.take() {
                let _ = started.send(());
            }
            if let (Some(threshold), Some(began)) = (self.slow_threshold, began) {
                let elapsed = began.elapsed();
                if elapsed > threshold {
                    self.stats.record_slow_step();
                    tracing::warn!(
                        task = %self.name,
                        elapsed_ms = elapsed.as_millis(),
                        threshold_ms = threshold.as_millis(),
                        "task blocked the runtime"
                    );
                }
            }
            poll
        })
        .await
    }
}

async fn handle_cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

fn termination_of(task: &str, error: TaskError) -> Termination {
    match error {
        TaskError::Exit(signal) => Termination::Exit(signal),
        TaskError::Interrupted => Termination::Interrupted,
        TaskError::Failed(error) => Termination::Fault {
            task: task.to_string(),
            error,
        },
    }
}

/// Extracts the message of a caught panic.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

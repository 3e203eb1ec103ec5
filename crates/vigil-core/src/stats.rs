//! Task statistics.
//!
//! Counts what happened to scheduled tasks over a run and how long they were
//! alive in total. Shared by every task of a controller; reported during
//! teardown at `debug`, or at `info` with the `task_stats` instrument.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Thread-safe task counters.
#[derive(Debug, Clone, Default)]
pub struct TaskStatistics {
    inner: Arc<StatsInner>,
}

#[derive(Debug, Default)]
struct StatsInner {
    scheduled: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    faulted: AtomicU64,
    // Sum of task lifetimes in microseconds
    busy_us: AtomicU64,
    busy_max_us: AtomicU64,
    slow_steps: AtomicU64,
}

/// Point-in-time copy of [`TaskStatistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Tasks handed to `schedule`.
    pub scheduled: u64,
    /// Tasks that began executing.
    pub started: u64,
    /// Tasks that returned successfully.
    pub completed: u64,
    /// Tasks stopped by cancellation.
    pub cancelled: u64,
    /// Tasks that returned an error or panicked.
    pub faulted: u64,
    /// Total lifetime of finished tasks.
    pub busy: Duration,
    /// Longest lifetime of a finished task.
    pub busy_max: Duration,
    /// Task steps slower than the `slow_tasks` threshold.
    pub slow_steps: u64,
}

/// Outcome of a single task, as counted by [`TaskStatistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Returned `Ok`.
    Completed,
    /// Cancelled before finishing.
    Cancelled,
    /// Returned an error or panicked.
    Faulted,
}

impl TaskStatistics {
    /// Creates zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_scheduled(&self) {
        self.inner.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks a task as started and returns its start time.
    pub(crate) fn record_started(&self) -> Instant {
        self.inner.started.fetch_add(1, Ordering::Relaxed);
        Instant::now()
    }

    /// Records how a task started at `started_at` ended.
    pub(crate) fn record_finished(&self, started_at: Instant, outcome: TaskOutcome) {
        let counter = match outcome {
            TaskOutcome::Completed => &self.inner.completed,
            TaskOutcome::Cancelled => &self.inner.cancelled,
            TaskOutcome::Faulted => &self.inner.faulted,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let us = u64::try_from(started_at.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.inner.busy_us.fetch_add(us, Ordering::Relaxed);
        self.inner.busy_max_us.fetch_max(us, Ordering::Relaxed);
    }

    pub(crate) fn record_slow_step(&self) {
        self.inner.slow_steps.fetch_add(1, Ordering::Relaxed);
    }

    /// Tasks that began executing.
    #[must_use]
    pub fn started(&self) -> u64 {
        self.inner.started.load(Ordering::Relaxed)
    }

    /// Tasks that returned successfully.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Relaxed)
    }

    /// Tasks stopped by cancellation.
    #[must_use]
    pub fn cancelled(&self) -> u64 {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    /// Tasks that returned an error or panicked.
    #[must_use]
    pub fn faulted(&self) -> u64 {
        self.inner.faulted.load(Ordering::Relaxed)
    }

    /// Task steps that exceeded the `slow_tasks` threshold.
    #[must_use]
    pub fn slow_steps(&self) -> u64 {
        self.inner.slow_steps.load(Ordering::Relaxed)
    }

    /// Tasks started but not finished yet.
    #[must_use]
    pub fn running(&self) -> u64 {
        let finished = self.completed() + self.cancelled() + self.faulted();
        self.started().saturating_sub(finished)
    }

    /// Copies all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            scheduled: self.inner.scheduled.load(Ordering::Relaxed),
            started: self.started(),
            completed: self.completed(),
            cancelled: self.cancelled(),
            faulted: self.faulted(),
            busy: Duration::from_micros(self.inner.busy_us.load(Ordering::Relaxed)),
            busy_max: Duration::from_micros(self.inner.busy_max_us.load(Ordering::Relaxed)),
            slow_steps: self.slow_steps(),
        }
    }

    pub(crate) fn log_summary(&self, verbose: bool) {
        let s = self.snapshot();
        macro_rules! summary {
            ($level:ident) => {
                tracing::$level!(
                    scheduled = s.scheduled,
                    started = s.started,
                    completed = s.completed,
                    cancelled = s.cancelled,
                    faulted = s.faulted,
                    slow_steps = s.slow_steps,
                    busy = %humantime::format_duration(round_ms(s.busy)),
                    longest = %humantime::format_duration(round_ms(s.busy_max)),
                    "task statistics"
                )
            };
        }
        if verbose {
            summary!(info);
        } else {
            summary!(debug);
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} started, {} completed, {} cancelled, {} faulted, busy {}",
            self.started,
            self.completed,
            self.cancelled,
            self.faulted,
            humantime::format_duration(round_ms(self.busy))
        )
    }
}

fn round_ms(duration: Duration) -> Duration {
    Duration::from_millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

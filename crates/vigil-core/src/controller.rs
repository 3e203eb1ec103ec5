//! The lifecycle controller.
//!
//! [`LifecycleController`] drives an application through
//! `Constructed → Prepared → Running → ShuttingDown → Terminated`:
//!
//! - `prepare` loads the configuration and hands it to the hooks;
//! - `run` creates the [`TaskTree`], lets the hooks start privileged tasks,
//!   starts queued tasks in FIFO order, then waits for the tree to finish;
//! - teardown runs exactly once when `run` ends, on every path.
//!
//! [`ControllerHandle`] is the cloneable view given to hooks and tasks.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use vigil_config::{ConfigLoader, Configuration};

use crate::error::{LifecycleError, Result};
use crate::exit::{DEFAULT_EXIT_CODE, ExitSignal, Termination};
use crate::hooks::AppHooks;
use crate::instruments::Instruments;
use crate::notify::{Notifier, NotifySink};
use crate::shim::panic_message;
use crate::signals;
use crate::spec::AppSpec;
use crate::stats::TaskStatistics;
use crate::task::{self, PendingTask, TaskContext, TaskError, TaskHandle, TaskOptions, TaskResult};
use crate::tree::TaskTree;
use crate::types::AppState;

/// Configuration key enabling debug mode.
pub const DEBUG_KEY: &str = "DEBUG";

struct Shared {
    spec: AppSpec,
    state: RwLock<AppState>,
    debug: AtomicBool,
    instruments: RwLock<Instruments>,
    config: RwLock<Arc<Configuration>>,
    scheduler: Mutex<Scheduler>,
    termination: Mutex<Option<Termination>>,
    stats: TaskStatistics,
    notifier: NotifySink,
}

/// Queue and tree, behind one lock so draining and scheduling never race.
#[derive(Default)]
struct Scheduler {
    tree: Option<TaskTree>,
    /// Set once queued tasks were drained into `tree`.
    started: bool,
    pending: VecDeque<PendingTask>,
}

/// Cloneable view of a controller, shared with hooks and tasks.
#[derive(Clone)]
pub struct ControllerHandle {
    shared: Arc<Shared>,
}

impl ControllerHandle {
    fn new(spec: AppSpec) -> Self {
        Self {
            shared: Arc::new(Shared {
                instruments: RwLock::new(spec.instruments()),
                spec,
                state: RwLock::new(AppState::Constructed),
                debug: AtomicBool::new(false),
                config: RwLock::new(Arc::new(Configuration::new())),
                scheduler: Mutex::new(Scheduler::default()),
                termination: Mutex::new(None),
                stats: TaskStatistics::new(),
                notifier: NotifySink::new(),
            }),
        }
    }

    /// Schedules a unit of work.
    ///
    /// Starts it right away if the tree is running, otherwise queues it until
    /// `run` starts the tree. Returns a handle when `options` is cancellable;
    /// it also works while the task is still queued.
    ///
    /// Work scheduled once the application is shutting down is dropped with
    /// a warning and `None` is returned.
    pub fn schedule<F, Fut>(&self, name: &str, options: TaskOptions, work: F) -> Option<TaskHandle>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let mut scheduler = self.shared.scheduler.lock();
        if self.is_shutting_down() {
            tracing::warn!(task = %name, "application is shutting down, task not scheduled");
            return None;
        }

        let (task, handle) = PendingTask::new(name, options, task::boxed(work));
        self.shared.stats.record_scheduled();
        if scheduler.started {
            if let Some(tree) = scheduler.tree.as_ref() {
                tree.spawn_pending(task);
                return handle;
            }
        }

        tracing::debug!(task = %name, "task queued until the task tree starts");
        scheduler.pending.push_back(task);
        handle
    }

    /// Cancels the task tree. Does nothing when no tree is running.
    pub fn request_shutdown(&self) {
        let tree = self.shared.scheduler.lock().tree.clone();
        let Some(tree) = tree else {
            tracing::debug!("shutdown requested but no task tree is running");
            return;
        };

        {
            let mut termination = self.shared.termination.lock();
            if termination.is_none() {
                *termination = Some(Termination::Shutdown);
            }
        }

        if !tree.is_cancelled() {
            tracing::info!("shutdown requested");
            tree.cancel();
        }
    }

    /// Records what ended the run. Only the first call counts.
    pub(crate) fn record_termination(&self, termination: Termination) -> bool {
        let mut slot = self.shared.termination.lock();
        if let Some(current) = slot.as_ref() {
            tracing::warn!(
                current = %current,
                discarded = %termination,
                "application is already stopping, ignoring"
            );
            return false;
        }
        *slot = Some(termination);
        true
    }

    /// Returns true once teardown has started.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.state().is_shutting_down()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AppState {
        *self.shared.state.read()
    }

    fn set_state(&self, state: AppState) {
        let old = std::mem::replace(&mut *self.shared.state.write(), state);
        if old != state {
            tracing::debug!(old = %old, new = %state, "state changed");
        }
    }

    /// The loaded configuration. Empty until `prepare` succeeds.
    #[must_use]
    pub fn configuration(&self) -> Arc<Configuration> {
        Arc::clone(&self.shared.config.read())
    }

    /// Whether debug mode is on.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.shared.debug.load(Ordering::Relaxed)
    }

    /// The application spec.
    #[must_use]
    pub fn spec(&self) -> &AppSpec {
        &self.shared.spec
    }

    /// Instruments enabled for this run.
    #[must_use]
    pub fn instruments(&self) -> Instruments {
        *self.shared.instruments.read()
    }

    /// Task counters of this controller.
    #[must_use]
    pub fn statistics(&self) -> TaskStatistics {
        self.shared.stats.clone()
    }

    /// Sends a single-line status to the service manager.
    pub fn notify_status(&self, message: &str) {
        self.shared.notifier.status(message);
    }

    /// Number of tasks waiting for the tree to start.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.scheduler.lock().pending.len()
    }
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("app", &self.shared.spec.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Drives an application built from [`AppHooks`].
pub struct LifecycleController<H: AppHooks> {
    hooks: H,
    handle: ControllerHandle,
    configurator: Option<ConfigLoader>,
    os_signals: bool,
}

impl<H: AppHooks> LifecycleController<H> {
    /// Creates a controller and lets `hooks` create their components.
    ///
    /// # Errors
    /// Fails if the application name is invalid.
    pub fn new(spec: AppSpec, mut hooks: H) -> Result<Self> {
        spec.validate()?;
        let handle = ControllerHandle::new(spec);
        hooks.create_components(&handle);

        Ok(Self {
            hooks,
            handle,
            configurator: None,
            os_signals: false,
        })
    }

    /// Sets where readiness and shutdown notifications go.
    #[must_use]
    pub fn with_notifier(self, notifier: impl Notifier + 'static) -> Self {
        self.handle.shared.notifier.replace(Arc::new(notifier));
        self
    }

    /// Interrupts the run on SIGINT, SIGTERM or SIGQUIT.
    #[must_use]
    pub const fn with_os_signals(mut self, enabled: bool) -> Self {
        self.os_signals = enabled;
        self
    }

    /// A handle for scheduling and shutdown requests.
    #[must_use]
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// The hooks.
    #[must_use]
    pub const fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Mutable access to the hooks.
    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AppState {
        self.handle.state()
    }

    /// Returns true once teardown has started.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.handle.is_shutting_down()
    }

    /// Whether debug mode is on.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.handle.debug()
    }

    /// The loaded configuration.
    #[must_use]
    pub fn configuration(&self) -> Arc<Configuration> {
        self.handle.configuration()
    }

    /// Task counters.
    #[must_use]
    pub fn statistics(&self) -> TaskStatistics {
        self.handle.statistics()
    }

    /// The loader used by the last `prepare`.
    pub fn configurator(&self) -> Result<&ConfigLoader> {
        self.configurator.as_ref().ok_or(LifecycleError::NotPrepared)
    }

    /// See [`ControllerHandle::schedule`].
    pub fn schedule<F, Fut>(&self, name: &str, options: TaskOptions, work: F) -> Option<TaskHandle>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.handle.schedule(name, options, work)
    }

    /// See [`ControllerHandle::request_shutdown`].
    pub fn request_shutdown(&self) {
        self.handle.request_shutdown();
    }

    /// Loads and processes the configuration.
    ///
    /// Returns `Ok(None)` when the application may run, or `Ok(Some(code))`
    /// when it must exit with `code`: 1 if a mandatory configuration file is
    /// missing, or the code of the [`ExitSignal`] returned by
    /// [`AppHooks::process_configuration`]. Debug mode is on when
    /// `force_debug` is set or the `DEBUG` key is truthy.
    ///
    /// # Errors
    /// Fails if the controller was already prepared or if a configuration
    /// source is unreadable or malformed.
    pub async fn prepare(&mut self, file: Option<&Path>, force_debug: bool) -> Result<Option<u8>> {
        let state = self.state();
        if state != AppState::Constructed {
            return Err(LifecycleError::invalid_state("prepare", state));
        }

        let mut loader = self.handle.spec().configurator();
        self.hooks.setup_configurator(&mut loader);
        let loaded = loader.load(file)?;
        let config = Arc::new(loader.result().clone());
        self.configurator = Some(loader);

        if !loaded {
            tracing::error!(app = %self.handle.spec().name(), "failed to load configuration");
            return Ok(Some(DEFAULT_EXIT_CODE));
        }

        let instruments = self.configurator.as_ref().map_or_else(Instruments::new, |loader| {
            loader
                .env_var(&self.handle.spec().instruments_variable())
                .map_or_else(Instruments::new, |list| Instruments::parse(&list))
        });
        let instruments = self.handle.spec().instruments().union(instruments);
        if instruments != Instruments::new() {
            tracing::info!(?instruments, "instrumentation enabled");
        }
        *self.handle.shared.instruments.write() = instruments;

        *self.handle.shared.config.write() = Arc::clone(&config);
        let debug = force_debug || config.is_truthy(DEBUG_KEY);
        self.handle.shared.debug.store(debug, Ordering::Relaxed);

        if let Err(signal) = self.hooks.process_configuration(&config, &self.handle).await {
            tracing::error!(code = signal.exit_code(), reason = %signal, "configuration rejected");
            return Ok(Some(signal.exit_code()));
        }

        self.handle.set_state(AppState::Prepared);
        Ok(None)
    }

    /// Runs the application and returns its exit code.
    ///
    /// Prepares first when needed. Teardown runs exactly once before this
    /// returns, also when a hook panics.
    pub async fn run(&mut self) -> u8 {
        let code = match AssertUnwindSafe(self.run_tree()).catch_unwind().await {
            Ok(code) => code,
            Err(panic) => {
                tracing::error!(error = %panic_message(&*panic), "application stopped by an unexpected error");
                DEFAULT_EXIT_CODE
            }
        };

        self.shut_down().await;
        code
    }

    async fn run_tree(&mut self) -> u8 {
        if self.state() == AppState::Constructed {
            match self.prepare(None, false).await {
                Ok(None) => {}
                Ok(Some(code)) => return code,
                Err(error) => {
                    tracing::error!(error = %error, "failed to prepare application");
                    return DEFAULT_EXIT_CODE;
                }
            }
        }

        let state = self.state();
        if state != AppState::Prepared {
            tracing::error!(state = %state, "application cannot run in this state");
            return DEFAULT_EXIT_CODE;
        }

        self.handle.set_state(AppState::Running);
        let tree = TaskTree::new(self.handle.clone());
        self.handle.shared.scheduler.lock().tree = Some(tree.clone());
        let bridge = self
            .os_signals
            .then(|| signals::bridge(self.handle.clone(), tree.clone()));

        if let Err(error) = self.hooks.on_tree_created(&tree).await {
            let termination = match error {
                TaskError::Exit(signal) => Termination::Exit(signal),
                TaskError::Interrupted => Termination::Interrupted,
                TaskError::Failed(error) => Termination::Exit(ExitSignal::new(format!("{error:#}"))),
            };
            self.handle.record_termination(termination);
            tree.cancel();
        }

        {
            let mut scheduler = self.handle.shared.scheduler.lock();
            scheduler.started = true;
            let count = scheduler.pending.len();
            for task in scheduler.pending.drain(..) {
                tree.spawn_pending(task);
            }
            tracing::debug!(count, "started queued tasks");
        }

        if !tree.is_cancelled() {
            self.hooks.ready(&self.handle).await;
            self.handle.shared.notifier.ready();
            tracing::info!(app = %self.handle.spec().full_name(), "application ready");
        }

        tree.close();
        tree.wait().await;

        // A task may have been spawned between the tree emptying and this lock.
        let straggler = {
            let mut scheduler = self.handle.shared.scheduler.lock();
            scheduler.tree = None;
            scheduler.started = false;
            !tree.is_empty()
        };
        if straggler {
            tree.cancel();
            tree.wait().await;
        }

        if let Some(bridge) = bridge {
            bridge.abort();
        }

        let termination = self
            .handle
            .shared
            .termination
            .lock()
            .take()
            .unwrap_or(Termination::Completed);
        report(&termination);
        termination.exit_code()
    }

    async fn shut_down(&mut self) {
        // Left over only when the run unwound or never started.
        let tree = {
            let mut scheduler = self.handle.shared.scheduler.lock();
            self.handle.set_state(AppState::ShuttingDown);
            scheduler.started = false;
            if !scheduler.pending.is_empty() {
                tracing::warn!(count = scheduler.pending.len(), "dropping tasks that never started");
                scheduler.pending.clear();
            }
            scheduler.tree.take()
        };
        if let Some(tree) = tree {
            tree.cancel();
            tree.close();
            tree.wait().await;
        }
        self.handle.shared.termination.lock().take();

        self.handle.shared.notifier.stopping();
        if let Err(panic) = AssertUnwindSafe(self.hooks.teardown(&self.handle))
            .catch_unwind()
            .await
        {
            tracing::error!(error = %panic_message(&*panic), "teardown failed");
        }

        self.handle.shared.stats.log_summary(self.handle.instruments().task_stats());
        self.handle.set_state(AppState::Terminated);
    }
}

impl<H: AppHooks> std::fmt::Debug for LifecycleController<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("handle", &self.handle)
            .field("os_signals", &self.os_signals)
            .finish_non_exhaustive()
    }
}

/// Logs the single top-level message of a finished run.
pub(crate) fn report(termination: &Termination) {
    match termination {
        Termination::Completed | Termination::Shutdown | Termination::Interrupted => {
            tracing::info!(reason = %termination, "application stopped");
        }
        Termination::Exit(signal) => {
            tracing::error!(code = signal.exit_code(), reason = %signal, "application exited");
        }
        Termination::Fault { task, error } => {
            tracing::error!(task = %task, error = format!("{error:#}"), "unprotected task failed");
        }
    }
}

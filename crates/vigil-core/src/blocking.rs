//! Blocking-mode controller.
//!
//! Same states and configuration handling as
//! [`LifecycleController`](crate::LifecycleController), but without a task
//! tree: `run` calls [`BlockingHooks::main`] once on the current thread and
//! catches exit requests, interrupts, failures and panics around that call.
//!
//! Interrupts are cooperative: `main` polls
//! [`BlockingContext::is_interrupted`] and returns. A run that returns after
//! an interrupt ends as interrupted, with exit code 0.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use vigil_config::{ConfigLoader, Configuration};

use crate::controller::{DEBUG_KEY, report};
use crate::error::{LifecycleError, Result};
use crate::exit::{DEFAULT_EXIT_CODE, ExitSignal, Termination};
use crate::notify::{Notifier, NotifySink};
use crate::shim::panic_message;
use crate::signals::{self, Interrupter};
use crate::spec::AppSpec;
use crate::task::{TaskError, TaskResult};
use crate::types::AppState;

/// Callbacks of a blocking application. Only `main` is required.
pub trait BlockingHooks {
    /// Adjusts the configuration loader before it runs.
    fn setup_configurator(&mut self, _loader: &mut ConfigLoader) {}

    /// Validates or applies the loaded configuration.
    fn process_configuration(&mut self, _config: &Configuration) -> std::result::Result<(), ExitSignal> {
        Ok(())
    }

    /// Called right before `main`.
    fn ready(&mut self) {}

    /// The body of the application.
    fn main(&mut self, ctx: &BlockingContext) -> TaskResult;

    /// Releases resources. Runs exactly once per `run`.
    fn teardown(&mut self) {}
}

/// What `main` gets to see.
#[derive(Debug, Clone)]
pub struct BlockingContext {
    config: Arc<Configuration>,
    debug: bool,
    interrupter: Interrupter,
}

impl BlockingContext {
    /// The loaded configuration.
    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    /// Whether debug mode is on.
    #[must_use]
    pub const fn debug(&self) -> bool {
        self.debug
    }

    /// Whether `main` was asked to stop.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupter.is_interrupted()
    }

    /// The flag behind [`is_interrupted`](Self::is_interrupted), for handing
    /// to worker threads.
    #[must_use]
    pub const fn interrupter(&self) -> &Interrupter {
        &self.interrupter
    }
}

/// Runs a [`BlockingHooks`] application.
pub struct BlockingController<H: BlockingHooks> {
    spec: AppSpec,
    hooks: H,
    state: AppState,
    debug: bool,
    config: Arc<Configuration>,
    configurator: Option<ConfigLoader>,
    notifier: NotifySink,
    interrupter: Interrupter,
    os_signals: bool,
}

impl<H: BlockingHooks> BlockingController<H> {
    /// Creates a controller.
    ///
    /// # Errors
    /// Fails if the application name is invalid.
    pub fn new(spec: AppSpec, hooks: H) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            spec,
            hooks,
            state: AppState::Constructed,
            debug: false,
            config: Arc::new(Configuration::new()),
            configurator: None,
            notifier: NotifySink::new(),
            interrupter: Interrupter::new(),
            os_signals: false,
        })
    }

    /// Sets where readiness and shutdown notifications go.
    #[must_use]
    pub fn with_notifier(self, notifier: impl Notifier + 'static) -> Self {
        self.notifier.replace(Arc::new(notifier));
        self
    }

    /// Raises the interrupt flag on SIGINT, SIGTERM or Ctrl-C during `run`.
    #[must_use]
    pub const fn with_os_signals(mut self, enabled: bool) -> Self {
        self.os_signals = enabled;
        self
    }

    /// The interrupt flag seen by `main`. Raising it stops the run the same
    /// way an OS interrupt does.
    #[must_use]
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> AppState {
        self.state
    }

    /// Returns true once teardown has started.
    #[must_use]
    pub const fn is_shutting_down(&self) -> bool {
        self.state.is_shutting_down()
    }

    /// Whether debug mode is on.
    #[must_use]
    pub const fn debug(&self) -> bool {
        self.debug
    }

    /// The loaded configuration.
    #[must_use]
    pub fn configuration(&self) -> Arc<Configuration> {
        Arc::clone(&self.config)
    }

    /// The loader used by the last `prepare`.
    pub fn configurator(&self) -> Result<&ConfigLoader> {
        self.configurator.as_ref().ok_or(LifecycleError::NotPrepared)
    }

    /// The hooks.
    #[must_use]
    pub const fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Loads and processes the configuration.
    ///
    /// Same contract as
    /// [`LifecycleController::prepare`](crate::LifecycleController::prepare).
    pub fn prepare(&mut self, file: Option<&Path>, force_debug: bool) -> Result<Option<u8>> {
        if self.state != AppState::Constructed {
            return Err(LifecycleError::invalid_state("prepare", self.state));
        }

        let mut loader = self.spec.configurator();
        self.hooks.setup_configurator(&mut loader);
        let loaded = loader.load(file)?;
        let config = Arc::new(loader.result().clone());
        self.configurator = Some(loader);

        if !loaded {
            tracing::error!(app = %self.spec.name(), "failed to load configuration");
            return Ok(Some(DEFAULT_EXIT_CODE));
        }

        self.debug = force_debug || config.is_truthy(DEBUG_KEY);
        self.config = config;

        if let Err(signal) = self.hooks.process_configuration(&self.config) {
            tracing::error!(code = signal.exit_code(), reason = %signal, "configuration rejected");
            return Ok(Some(signal.exit_code()));
        }

        self.set_state(AppState::Prepared);
        Ok(None)
    }

    /// Runs `main` once and returns the exit code.
    pub fn run(&mut self) -> u8 {
        let code = match catch_unwind(AssertUnwindSafe(|| self.run_main())) {
            Ok(code) => code,
            Err(panic) => {
                tracing::error!(error = %panic_message(&*panic), "application stopped by an unexpected error");
                DEFAULT_EXIT_CODE
            }
        };

        self.set_state(AppState::ShuttingDown);
        self.notifier.stopping();
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.hooks.teardown())) {
            tracing::error!(error = %panic_message(&*panic), "teardown failed");
        }
        self.set_state(AppState::Terminated);
        code
    }

    fn run_main(&mut self) -> u8 {
        if self.state == AppState::Constructed {
            match self.prepare(None, false) {
                Ok(None) => {}
                Ok(Some(code)) => return code,
                Err(error) => {
                    tracing::error!(error = %error, "failed to prepare application");
                    return DEFAULT_EXIT_CODE;
                }
            }
        }

        if self.state != AppState::Prepared {
            tracing::error!(state = %self.state, "application cannot run in this state");
            return DEFAULT_EXIT_CODE;
        }

        self.set_state(AppState::Running);
        if self.os_signals {
            signals::watch(&self.interrupter);
        }
        self.hooks.ready();
        self.notifier.ready();

        let ctx = BlockingContext {
            config: Arc::clone(&self.config),
            debug: self.debug,
            interrupter: self.interrupter.clone(),
        };
        let termination = match self.hooks.main(&ctx) {
            Ok(()) if ctx.is_interrupted() => Termination::Interrupted,
            Ok(()) => Termination::Completed,
            Err(TaskError::Exit(signal)) => Termination::Exit(signal),
            Err(TaskError::Interrupted) => Termination::Interrupted,
            Err(TaskError::Failed(error)) => Termination::Fault {
                task: "main".to_string(),
                error,
            },
        };

        report(&termination);
        termination.exit_code()
    }

    fn set_state(&mut self, state: AppState) {
        if self.state != state {
            tracing::debug!(old = %self.state, new = %state, "state changed");
            self.state = state;
        }
    }
}

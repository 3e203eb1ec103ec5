// Demos are allowed to use expect/unwrap for simplicity
#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Vigil Daemon Demo
//!
//! A counter daemon: a ticker task counts until Ctrl+C, a protected reporter
//! logs the count, and an optional limit ends the run with an exit code.
//!
//! # Usage
//!
//! ```bash
//! # Run until Ctrl+C
//! cargo run --example daemon
//!
//! # Read settings from a file, log at debug
//! cargo run --example daemon -- --config counter.toml --debug
//!
//! # Or point the environment at it
//! COUNTER_SETTINGS=counter.toml cargo run --example daemon
//!
//! # Warn about task steps over 10ms, report task statistics at info
//! COUNTER_INSTRUMENTS=slow_tasks,task_stats cargo run --example daemon
//! ```
//!
//! Recognized settings: `TICK_MS` (default 1000), `LIMIT` (stop after that
//! many ticks, exit code 3), `DEBUG`.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use vigil::prelude::*;

const NAME: &str = "counter";
const LIMIT_EXIT_CODE: u8 = 3;

#[derive(Default)]
struct CounterDaemon {
    counter: Arc<AtomicU64>,
    tick: Duration,
    limit: Option<u64>,
}

#[async_trait]
impl AppHooks for CounterDaemon {
    fn create_components(&mut self, controller: &ControllerHandle) {
        let counter = Arc::clone(&self.counter);
        controller.schedule("reporter", TaskOptions::new().protected(), move |ctx| async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                tokio::select! {
                    () = ctx.cancelled() => return Ok(()),
                    _ = interval.tick() => {
                        let count = counter.load(Ordering::Relaxed);
                        tracing::info!(count, "counter status");
                        ctx.controller().notify_status(&format!("count {count}"));
                    }
                }
            }
        });
    }

    fn setup_configurator(&mut self, loader: &mut ConfigLoader) {
        loader.policy_mut().set_merge_keys(MergeKeys::keys(["LIMITS"]));
    }

    async fn process_configuration(
        &mut self,
        config: &Configuration,
        _controller: &ControllerHandle,
    ) -> Result<(), ExitSignal> {
        let tick_ms = config.get_i64("TICK_MS").unwrap_or(1000);
        let tick_ms = u64::try_from(tick_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or_else(|| {
                ExitSignal::new(format!("TICK_MS must be positive, got {tick_ms}")).with_code(2)
            })?;
        self.tick = Duration::from_millis(tick_ms);
        self.limit = config.get_i64("LIMIT").and_then(|l| u64::try_from(l).ok());
        Ok(())
    }

    async fn on_tree_created(&mut self, tree: &TaskTree) -> TaskResult {
        let counter = Arc::clone(&self.counter);
        let tick = self.tick;
        let limit = self.limit;
        tree.start("ticker", TaskOptions::new(), move |ctx, started| async move {
            let mut interval = tokio::time::interval(tick);
            started.started();
            while !ctx.is_cancelled() {
                interval.tick().await;
                let count = counter.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(count, "tick");
                if limit.is_some_and(|limit| count >= limit) {
                    return Err(ExitSignal::new(format!("reached {count} ticks"))
                        .with_code(LIMIT_EXIT_CODE)
                        .into());
                }
            }
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn ready(&mut self, controller: &ControllerHandle) {
        tracing::info!(
            tick_ms = self.tick.as_millis(),
            limit = ?self.limit,
            pid = std::process::id(),
            "counter running"
        );
        controller.notify_status("counting");
    }

    async fn teardown(&mut self, controller: &ControllerHandle) {
        let stats = controller.statistics().snapshot();
        tracing::info!(count = self.counter.load(Ordering::Relaxed), %stats, "counter stopped");
    }
}

fn parse_args() -> (Option<PathBuf>, bool) {
    let mut config = None;
    let mut debug = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => config = args.next().map(PathBuf::from),
            "--debug" | "-d" => debug = true,
            "--help" | "-h" => {
                println!("Usage: daemon [--config FILE] [--debug]");
                std::process::exit(0);
            }
            other => {
                eprintln!("unknown argument: {other}");
                std::process::exit(2);
            }
        }
    }
    (config, debug)
}

#[tokio::main]
async fn main() {
    let (config, debug) = parse_args();
    vigil::logging::init_logging(NAME, debug);

    let spec = AppSpec::new(NAME)
        .with_full_name("Vigil Counter Demo")
        .with_version(env!("CARGO_PKG_VERSION"));
    let mut app = LifecycleController::new(spec, CounterDaemon::default())
        .expect("valid application name")
        .with_os_signals(true);

    let code = match app.prepare(config.as_deref(), debug).await {
        Ok(None) => app.run().await,
        Ok(Some(code)) => code,
        Err(error) => {
            tracing::error!(error = %error, "cannot start");
            1
        }
    };
    std::process::exit(i32::from(code));
}

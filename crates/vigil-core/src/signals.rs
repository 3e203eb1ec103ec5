//! OS signal bridge.
//!
//! Turns SIGINT, SIGTERM and SIGQUIT (Ctrl-C elsewhere) into an interrupt of
//! the running task tree. Interrupts end a run with exit code 0.
//!
//! Blocking applications have no runtime to deliver signals to; they get an
//! [`Interrupter`] flag instead, raised from a `ctrlc` handler thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::controller::ControllerHandle;
use crate::exit::Termination;
use crate::tree::TaskTree;

/// Completes when the process receives a termination signal.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv() => tracing::debug!(signal = "SIGINT", "received signal"),
        _ = sigterm.recv() => tracing::debug!(signal = "SIGTERM", "received signal"),
        _ = sigquit.recv() => tracing::debug!(signal = "SIGQUIT", "received signal"),
    }
    Ok(())
}

/// Completes when the process receives Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Interrupts `tree` on the first termination signal.
///
/// The returned task ends on its own once the tree is cancelled.
pub(crate) fn bridge(controller: ControllerHandle, tree: TaskTree) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = tree.token().cancelled() => {}
            result = wait_for_shutdown_signal() => match result {
                Ok(()) => {
                    tracing::info!("interrupt received, stopping");
                    controller.record_termination(Termination::Interrupted);
                    tree.cancel();
                }
                Err(error) => {
                    tracing::warn!(error = %error, "cannot listen for termination signals");
                }
            },
        }
    })
}

/// Interrupt flag shared between a blocking `main` and whoever stops it.
#[derive(Debug, Clone, Default)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
}

impl Interrupter {
    /// Creates a lowered flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Returns false if it was already raised.
    pub fn interrupt(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    /// Whether the flag is raised.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

static WATCHED: Mutex<Vec<Weak<AtomicBool>>> = parking_lot::const_mutex(Vec::new());
static HANDLER: OnceLock<Result<(), String>> = OnceLock::new();

/// Raises `interrupter` on SIGINT, SIGTERM or Ctrl-C.
///
/// The process-wide handler is installed on first use and outlives the
/// interrupters it serves.
pub(crate) fn watch(interrupter: &Interrupter) {
    {
        let mut watched = WATCHED.lock();
        watched.retain(|flag| flag.strong_count() > 0);
        watched.push(Arc::downgrade(&interrupter.flag));
    }

    let installed = HANDLER.get_or_init(|| ctrlc::set_handler(raise_all).map_err(|error| error.to_string()));
    if let Err(error) = installed {
        tracing::warn!(error = %error, "cannot listen for termination signals");
    }
}

fn raise_all() {
    for flag in WATCHED.lock().iter().filter_map(Weak::upgrade) {
        if flag.swap(true, Ordering::SeqCst) {
            tracing::warn!("interrupt already pending, waiting for main to return");
        } else {
            tracing::info!("interrupt received, stopping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupter_raises_once() {
        let interrupter = Interrupter::new();
        let other = interrupter.clone();
        assert!(!interrupter.is_interrupted());
        assert!(other.interrupt());
        assert!(!interrupter.interrupt());
        assert!(interrupter.is_interrupted());
    }

    #[test]
    fn test_raise_all_reaches_watched_flags() {
        let watched = Interrupter::new();
        let unwatched = Interrupter::new();
        watch(&watched);

        raise_all();
        assert!(watched.is_interrupted());
        assert!(!unwatched.is_interrupted());
    }
}

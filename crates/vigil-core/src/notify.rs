//! Service manager notifications.
//!
//! The controller reports readiness, shutdown and free-form status through a
//! [`Notifier`]. Delivery is best-effort: failures are logged at `debug` and
//! never affect the lifecycle.

use std::sync::Arc;

use parking_lot::RwLock;

/// Errors raised by a notifier.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Status messages must fit on one line.
    #[error("status message must not contain newlines")]
    InvalidMessage,

    /// No service manager is listening.
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),

    /// Transport failure.
    #[error("notification failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Sink for service manager notifications.
pub trait Notifier: Send + Sync {
    /// The application finished starting up.
    fn ready(&self) -> Result<(), NotifyError>;

    /// The application is shutting down.
    fn stopping(&self) -> Result<(), NotifyError>;

    /// Free-form single-line status.
    fn status(&self, message: &str) -> Result<(), NotifyError>;
}

/// Notifier that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn ready(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    fn stopping(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    fn status(&self, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Best-effort front for the configured notifier.
pub(crate) struct NotifySink {
    inner: RwLock<Arc<dyn Notifier>>,
}

impl NotifySink {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(NullNotifier)),
        }
    }

    pub(crate) fn replace(&self, notifier: Arc<dyn Notifier>) {
        *self.inner.write() = notifier;
    }

    fn current(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.inner.read())
    }

    pub(crate) fn ready(&self) {
        report("ready", self.current().ready());
    }

    pub(crate) fn stopping(&self) {
        report("stopping", self.current().stopping());
    }

    pub(crate) fn status(&self, message: &str) {
        let result = if message.contains('\n') {
            Err(NotifyError::InvalidMessage)
        } else {
            self.current().status(message)
        };
        report("status", result);
    }
}

fn report(kind: &'static str, result: Result<(), NotifyError>) {
    if let Err(error) = result {
        tracing::debug!(kind, error = %error, "notification not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        statuses: Mutex<Vec<String>>,
    }

    impl Notifier for Recorder {
        fn ready(&self) -> Result<(), NotifyError> {
            Err(NotifyError::Unavailable("no socket".into()))
        }

        fn stopping(&self) -> Result<(), NotifyError> {
            Ok(())
        }

        fn status(&self, message: &str) -> Result<(), NotifyError> {
            self.statuses.lock().push(message.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_multiline_status_never_reaches_notifier() {
        let recorder = Arc::new(Recorder::default());
        let sink = NotifySink::new();
        sink.replace(recorder.clone());

        sink.status("serving 3 clients");
        sink.status("line one\nline two");

        assert_eq!(*recorder.statuses.lock(), ["serving 3 clients"]);
    }

    #[test]
    fn test_failures_are_swallowed() {
        let sink = NotifySink::new();
        sink.replace(Arc::new(Recorder::default()));
        sink.ready();
        sink.stopping();
    }
}

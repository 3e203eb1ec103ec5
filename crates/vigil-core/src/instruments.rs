//! Opt-in runtime instrumentation.
//!
//! Instruments are enabled from the [`AppSpec`](crate::AppSpec) or from a
//! comma-separated list in the `<NAME>_INSTRUMENTS` environment variable:
//!
//! - `slow_tasks`: warns whenever a single step of a task keeps a runtime
//!   thread busy for longer than a threshold (10 ms by default);
//! - `task_stats`: reports task statistics at `info` instead of `debug`
//!   during teardown.

use std::time::Duration;

/// Suffix of the environment variable listing enabled instruments.
pub const INSTRUMENTS_VARIABLE_SUFFIX: &str = "_INSTRUMENTS";

/// Step duration above which `slow_tasks` warns.
pub const DEFAULT_SLOW_TASK_THRESHOLD: Duration = Duration::from_millis(10);

/// Set of enabled instruments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Instruments {
    slow_task_threshold: Option<Duration>,
    task_stats: bool,
}

impl Instruments {
    /// No instruments.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slow_task_threshold: None,
            task_stats: false,
        }
    }

    /// Warns about task steps longer than `threshold`.
    #[must_use]
    pub const fn with_slow_tasks(mut self, threshold: Duration) -> Self {
        self.slow_task_threshold = Some(threshold);
        self
    }

    /// Reports task statistics at `info`.
    #[must_use]
    pub const fn with_task_stats(mut self) -> Self {
        self.task_stats = true;
        self
    }

    /// Threshold of the slow task detector, if enabled.
    #[must_use]
    pub const fn slow_task_threshold(&self) -> Option<Duration> {
        self.slow_task_threshold
    }

    /// Whether task statistics are reported at `info`.
    #[must_use]
    pub const fn task_stats(&self) -> bool {
        self.task_stats
    }

    /// Parses a comma-separated list of instrument names.
    ///
    /// Names are case-insensitive; unknown names are logged and skipped.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        let mut instruments = Self::new();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match name.to_ascii_lowercase().as_str() {
                "slow_tasks" => instruments = instruments.with_slow_tasks(DEFAULT_SLOW_TASK_THRESHOLD),
                "task_stats" => instruments = instruments.with_task_stats(),
                _ => tracing::warn!(instrument = name, "unknown instrument, ignoring"),
            }
        }
        instruments
    }

    /// Instruments enabled in either set. The lower threshold wins.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        let slow_task_threshold = match (self.slow_task_threshold, other.slow_task_threshold) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            slow_task_threshold,
            task_stats: self.task_stats || other.task_stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Instruments::parse(""), Instruments::new());

        let parsed = Instruments::parse(" Slow_Tasks , task_stats,,bogus");
        assert_eq!(parsed.slow_task_threshold(), Some(DEFAULT_SLOW_TASK_THRESHOLD));
        assert!(parsed.task_stats());

        let parsed = Instruments::parse("task_trace");
        assert_eq!(parsed, Instruments::new());
    }

    #[test]
    fn test_union() {
        let a = Instruments::new().with_slow_tasks(Duration::from_millis(50));
        let b = Instruments::new()
            .with_slow_tasks(Duration::from_millis(5))
            .with_task_stats();

        let both = a.union(b);
        assert_eq!(both.slow_task_threshold(), Some(Duration::from_millis(5)));
        assert!(both.task_stats());
        assert_eq!(Instruments::new().union(a), a);
    }
}

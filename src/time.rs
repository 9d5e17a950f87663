//! Clock abstraction (injectable for testing).
//!
//! Injecting the current time rather than calling
//! `SystemTime::now()`/`Instant::now()` directly keeps recovery's staleness
//! checks (`MaxSubmit`, `MaxLastUpdate`) and the executor's `Start`/`End`
//! timestamps deterministic in tests.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Provides the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time as a duration since the Unix epoch.
    fn now(&self) -> Duration;
}

/// The default [`Clock`], backed by the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

/// A fixed clock, for deterministic tests (recovery staleness windows, etc).
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Duration);

impl Clock for FixedClock {
    fn now(&self) -> Duration {
        self.0
    }
}

//! Clock abstraction for determinism.

use chrono::{DateTime, Utc};

/// Abstraction over system time, used wherever a store or handler needs
/// "now" without reading the system clock directly.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

//! Clock abstraction for determinism.

use chrono::Utc;

use crate::datetime::Datetime;

/// Abstraction over system time for deterministic event stamping.
pub trait Clock: Send + Sync {
    /// Returns the current time, at the microsecond precision events are
    /// recorded with.
    fn now(&self) -> Datetime;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Datetime {
        Datetime::from(Utc::now())
    }
}

//! Test clocks: deterministic `Clock` implementations for tests.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chronicle_core::clock::Clock;
use chronicle_core::datetime::Datetime;

/// 2026-01-15T10:00:00Z, the instant test clocks start from.
pub const EPOCH_SECONDS: i64 = 1_768_471_200;

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(EPOCH_SECONDS, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// A clock that always returns a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// A fixed clock at [`EPOCH_SECONDS`] plus `seconds`.
    #[must_use]
    pub fn at(seconds: i64) -> Self {
        Self(epoch() + TimeDelta::seconds(seconds))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Datetime {
        Datetime::from(self.0)
    }
}

/// A clock that advances by one millisecond on every reading, so events
/// raised in sequence get strictly increasing timestamps.
#[derive(Debug, Default)]
pub struct SteppingClock {
    ticks: AtomicI64,
}

impl SteppingClock {
    /// Creates a clock whose first reading is [`EPOCH_SECONDS`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Datetime {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        Datetime::from(epoch() + TimeDelta::milliseconds(tick))
    }
}

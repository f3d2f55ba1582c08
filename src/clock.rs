//! Wall-clock time source

use std::fmt;

use chrono::{DateTime, Utc};

/// Provides the current wall-clock time on demand.
///
/// Expiry decisions are anchored to timestamps from this trait rather than
/// counted ticks, so they stay correct even when the scheduler was suspended
/// and ticks were delayed or missed.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

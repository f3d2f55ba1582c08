//! Idle monitor state structure

use chrono::{DateTime, Utc};

use crate::tasks::TimerSlot;

/// Mutable state owned exclusively by the idle monitor.
///
/// Never more than one idle-wait schedule and one warning schedule exist at
/// a time; `idling == true` and a live idle-wait timer never coexist.
#[derive(Debug)]
pub struct IdleState {
    /// Whether the monitor is observing the session.
    pub running: bool,
    /// Whether the session is currently considered idle.
    pub idling: bool,
    /// Seconds remaining in the warning phase; meaningful only while idling
    /// with the timeout phase enabled. Frozen at 0 once timed out.
    pub countdown: u64,
    /// Wall-clock anchor of the most recent activity reset.
    pub last_activity_at: DateTime<Utc>,
    /// Single-shot timer waiting out the idle duration.
    pub idle_timer: TimerSlot,
    /// One-second warning countdown timer.
    pub warning_timer: TimerSlot,
}

impl IdleState {
    /// Create a stopped state anchored at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            running: false,
            idling: false,
            countdown: 0,
            last_activity_at: now,
            idle_timer: TimerSlot::new(),
            warning_timer: TimerSlot::new(),
        }
    }

    /// Cancel both timer slots.
    pub fn cancel_timers(&mut self) {
        self.idle_timer.cancel();
        self.warning_timer.cancel();
    }
}

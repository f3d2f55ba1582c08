//! Keepalive monitor state structure

use crate::tasks::TimerSlot;

/// Mutable state owned exclusively by the keepalive monitor.
#[derive(Debug, Default)]
pub struct KeepaliveState {
    /// Whether the periodic heartbeat is scheduled.
    pub running: bool,
    /// The heartbeat timer slot.
    pub heartbeat: TimerSlot,
}

impl KeepaliveState {
    /// Create a stopped state with no heartbeat scheduled.
    pub fn new() -> Self {
        Self::default()
    }
}

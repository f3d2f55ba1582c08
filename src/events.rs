//! Monitor lifecycle events and the bus they are published on

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Default number of events a slow subscriber may lag behind.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Lifecycle events emitted by the idle and keepalive monitors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MonitorEvent {
    /// The idle duration elapsed with no activity.
    IdleStart,
    /// Warning countdown value; emitted at idle onset and then each second,
    /// strictly descending.
    IdleWarn(u64),
    /// The warning countdown reached zero, or activity arrived after expiry.
    IdleTimeout,
    /// The session resumed from idling.
    IdleEnd,
    /// A heartbeat fired or an explicit ping was requested.
    Keepalive,
    /// The heartbeat HTTP call completed. `error` carries a transport
    /// failure; an HTTP status of any class is reported in `status` with no
    /// error.
    KeepaliveResponse {
        error: Option<String>,
        status: Option<u16>,
    },
}

/// Publish/subscribe fan-out shared by both monitors and the host.
///
/// `emit` enqueues the event to every current subscriber before returning;
/// each subscriber observes events in emission order.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber backlog capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn emit(&self, event: MonitorEvent) {
        if let Err(err) = self.sender.send(event) {
            debug!("monitor event dropped, no subscribers: {:?}", err.0);
        }
    }

    /// Open a new subscription starting at the next emitted event.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

//! Keepalive heartbeat monitor

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::error;

use crate::config::KeepaliveOptions;
use crate::error::Error;
use crate::events::{EventBus, MonitorEvent};
use crate::state::KeepaliveState;
use crate::tasks;

/// Periodic "keep session alive" heartbeat.
///
/// While running, emits [`MonitorEvent::Keepalive`] every interval and, when
/// an HTTP target is configured, pings it and reports the outcome through
/// [`MonitorEvent::KeepaliveResponse`]. Cheap to clone; clones share the
/// same state.
#[derive(Debug, Clone)]
pub struct Keepalive {
    inner: Arc<KeepaliveInner>,
}

#[derive(Debug)]
struct KeepaliveInner {
    options: Mutex<KeepaliveOptions>,
    state: Mutex<KeepaliveState>,
    bus: EventBus,
    client: reqwest::Client,
}

impl KeepaliveInner {
    fn options_snapshot(&self) -> Result<KeepaliveOptions, Error> {
        Ok(self
            .options
            .lock()
            .map_err(|_| Error::StatePoisoned)?
            .clone())
    }
}

impl Keepalive {
    /// Create a stopped monitor publishing on `bus`.
    pub fn new(options: KeepaliveOptions, bus: EventBus) -> Result<Self, Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            inner: Arc::new(KeepaliveInner {
                options: Mutex::new(options),
                state: Mutex::new(KeepaliveState::new()),
                bus,
                client,
            }),
        })
    }

    /// Schedule the heartbeat at the configured interval, replacing any
    /// existing schedule. Idempotent; calling again reschedules from now.
    pub fn start(&self) -> Result<(), Error> {
        let interval = self.inner.options_snapshot()?.interval_secs();
        let mut state = self.inner.state.lock().map_err(|_| Error::StatePoisoned)?;
        let monitor = Arc::downgrade(&self.inner);
        state.heartbeat.schedule(tasks::spawn_repeating(
            Duration::from_secs(interval),
            move || on_heartbeat(&monitor),
        ));
        state.running = true;
        Ok(())
    }

    /// Cancel the heartbeat schedule. No-op when not running.
    pub fn stop(&self) -> Result<(), Error> {
        let mut state = self.inner.state.lock().map_err(|_| Error::StatePoisoned)?;
        state.heartbeat.cancel();
        state.running = false;
        Ok(())
    }

    /// Perform the ping action once, immediately, without touching the
    /// heartbeat schedule.
    pub fn ping(&self) -> Result<(), Error> {
        ping_action(&self.inner)
    }

    /// Update the heartbeat interval for subsequent `start()` calls. An
    /// already-running schedule keeps its old cadence.
    pub fn set_interval(&self, secs: u64) -> Result<(), Error> {
        if secs == 0 {
            return Err(Error::InvalidKeepaliveInterval);
        }
        self.inner
            .options
            .lock()
            .map_err(|_| Error::StatePoisoned)?
            .set_interval_secs(secs);
        Ok(())
    }

    /// Whether the heartbeat is currently scheduled.
    pub fn running(&self) -> Result<bool, Error> {
        Ok(self
            .inner
            .state
            .lock()
            .map_err(|_| Error::StatePoisoned)?
            .running)
    }

    /// Snapshot of the current options.
    pub fn options(&self) -> Result<KeepaliveOptions, Error> {
        self.inner.options_snapshot()
    }
}

fn on_heartbeat(inner: &Weak<KeepaliveInner>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    if let Err(err) = ping_action(&inner) {
        error!("keepalive heartbeat failed: {err}");
    }
}

/// Emit the heartbeat event and, when a target is configured, fire the ping
/// request. The request outcome is always reported as an event; nothing
/// escapes a timer callback.
fn ping_action(inner: &Arc<KeepaliveInner>) -> Result<(), Error> {
    inner.bus.emit(MonitorEvent::Keepalive);

    let target = inner.options_snapshot()?.http_target().cloned();
    if let Some(target) = target {
        let client = inner.client.clone();
        let bus = inner.bus.clone();
        tokio::spawn(async move {
            let (error, status) = crate::services::execute_ping(&client, &target).await;
            bus.emit(MonitorEvent::KeepaliveResponse { error, status });
        });
    }
    Ok(())
}

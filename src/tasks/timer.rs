//! Cancellable timer slots backed by tokio tasks

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

/// Spawn a task that invokes `tick` once after `delay`.
pub fn spawn_once<F>(delay: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        time::sleep(delay).await;
        tick();
    })
}

/// Spawn a task that invokes `tick` every `period`, first fire one period
/// from now. Ticks missed while the scheduler was stalled are delivered as a
/// burst on wake.
pub fn spawn_repeating<F>(period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            tick();
        }
    })
}

/// One logical timer slot holding at most one live schedule.
///
/// Scheduling always cancels the slot's predecessor first, which makes
/// restarts idempotent even when triggered from inside an event handler.
#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    /// Empty slot with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new schedule, cancelling any prior one.
    pub fn schedule(&mut self, handle: JoinHandle<()>) {
        self.cancel();
        self.handle = Some(handle);
    }

    /// Cancel the outstanding schedule, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether a schedule is installed and still live.
    pub fn is_scheduled(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

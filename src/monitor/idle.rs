//! Idle detection state machine

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::error;

use crate::clock::{Clock, SystemClock};
use crate::config::{IdleOptions, TimeoutSetting};
use crate::error::Error;
use crate::events::{EventBus, MonitorEvent};
use crate::monitor::Keepalive;
use crate::state::IdleState;
use crate::tasks;

/// Tracks session activity and drives the idle/warning/timeout lifecycle.
///
/// The host reports activity through [`interrupt`](Idle::interrupt); the
/// monitor emits [`MonitorEvent`]s on the shared bus and sequences the
/// keepalive heartbeat around idle transitions. Cheap to clone; clones share
/// the same state.
#[derive(Debug, Clone)]
pub struct Idle {
    inner: Arc<IdleInner>,
}

#[derive(Debug)]
struct IdleInner {
    options: Mutex<IdleOptions>,
    state: Mutex<IdleState>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    keepalive: Option<Keepalive>,
}

impl IdleInner {
    fn options_snapshot(&self) -> Result<IdleOptions, Error> {
        Ok(self
            .options
            .lock()
            .map_err(|_| Error::StatePoisoned)?
            .clone())
    }

    /// The keepalive collaborator, only when integration is enabled.
    fn keepalive(&self, options: &IdleOptions) -> Option<&Keepalive> {
        if options.keepalive_enabled() {
            self.keepalive.as_ref()
        } else {
            None
        }
    }
}

impl Idle {
    /// Create a stopped monitor using the system clock.
    pub fn new(options: IdleOptions, keepalive: Option<Keepalive>, bus: EventBus) -> Self {
        Self::with_clock(options, keepalive, bus, Arc::new(SystemClock))
    }

    /// Create a stopped monitor with an injected time source.
    pub fn with_clock(
        options: IdleOptions,
        keepalive: Option<Keepalive>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = IdleState::new(clock.now());
        Self {
            inner: Arc::new(IdleInner {
                options: Mutex::new(options),
                state: Mutex::new(state),
                clock,
                bus,
                keepalive,
            }),
        }
    }

    /// Start (or reset) observation: cancel outstanding timers, anchor the
    /// activity timestamp at now, and arm the idle-wait timer.
    ///
    /// Silent on a plain reset; a resume from idling emits
    /// [`MonitorEvent::IdleEnd`] and pings the keepalive target before the
    /// heartbeat is rescheduled.
    pub fn watch(&self) -> Result<(), Error> {
        watch_now(&self.inner)
    }

    /// Stop observation and cancel all outstanding timers.
    pub fn unwatch(&self) -> Result<(), Error> {
        let mut state = self.inner.state.lock().map_err(|_| Error::StatePoisoned)?;
        state.cancel_timers();
        state.running = false;
        Ok(())
    }

    /// Host-reported activity signal.
    ///
    /// Ignored while stopped. Activity arriving after the absolute expiry
    /// point is too late to reset anything and forces the timed-out state
    /// instead. Otherwise the idle-wait timer is reset; an interrupt while
    /// idling resumes only when auto-resume is enabled.
    pub fn interrupt(&self) -> Result<(), Error> {
        let options = self.inner.options_snapshot()?;
        let mut state = self.inner.state.lock().map_err(|_| Error::StatePoisoned)?;
        if !state.running {
            return Ok(());
        }

        if options.timeout_secs() > 0
            && is_past_expiry(self.inner.clock.now(), state.last_activity_at, &options)
        {
            state.cancel_timers();
            state.idling = true;
            state.countdown = 0;
            if let Some(keepalive) = self.inner.keepalive(&options) {
                keepalive.stop()?;
            }
            self.inner.bus.emit(MonitorEvent::IdleTimeout);
            return Ok(());
        }

        let resume = !state.idling || options.auto_resume_enabled();
        drop(state);
        if resume {
            watch_now(&self.inner)?;
        }
        Ok(())
    }

    /// Whether the absolute expiry point has been reached.
    pub fn is_expired(&self) -> Result<bool, Error> {
        let options = self.inner.options_snapshot()?;
        let state = self.inner.state.lock().map_err(|_| Error::StatePoisoned)?;
        Ok(is_past_expiry(
            self.inner.clock.now(),
            state.last_activity_at,
            &options,
        ))
    }

    /// Whether the monitor is observing the session.
    pub fn running(&self) -> Result<bool, Error> {
        Ok(self
            .inner
            .state
            .lock()
            .map_err(|_| Error::StatePoisoned)?
            .running)
    }

    /// Whether the session is currently considered idle.
    pub fn idling(&self) -> Result<bool, Error> {
        Ok(self
            .inner
            .state
            .lock()
            .map_err(|_| Error::StatePoisoned)?
            .idling)
    }

    /// Update the idle duration; applied immediately when running.
    pub fn set_idle(&self, secs: u64) -> Result<(), Error> {
        if secs == 0 {
            return Err(Error::InvalidIdleDuration);
        }
        self.inner
            .options
            .lock()
            .map_err(|_| Error::StatePoisoned)?
            .set_idle_secs(secs);
        self.restart_if_running()
    }

    /// Update or disable the warning phase; applied immediately when
    /// running.
    pub fn set_timeout(&self, timeout: impl Into<TimeoutSetting>) -> Result<(), Error> {
        let secs = timeout.into().seconds();
        self.inner
            .options
            .lock()
            .map_err(|_| Error::StatePoisoned)?
            .set_timeout_secs(secs);
        self.restart_if_running()
    }

    /// Snapshot of the current options.
    pub fn options(&self) -> Result<IdleOptions, Error> {
        self.inner.options_snapshot()
    }

    fn restart_if_running(&self) -> Result<(), Error> {
        if self.running()? {
            self.unwatch()?;
            self.watch()?;
        }
        Ok(())
    }
}

fn is_past_expiry(now: DateTime<Utc>, last_activity_at: DateTime<Utc>, options: &IdleOptions) -> bool {
    let window = TimeDelta::seconds((options.idle_secs() + options.timeout_secs()) as i64);
    now >= last_activity_at + window
}

fn watch_now(inner: &Arc<IdleInner>) -> Result<(), Error> {
    let options = inner.options_snapshot()?;
    let mut state = inner.state.lock().map_err(|_| Error::StatePoisoned)?;

    state.cancel_timers();
    let resuming = state.idling;
    state.idling = false;
    state.running = true;
    state.last_activity_at = inner.clock.now();

    let monitor = Arc::downgrade(inner);
    state.idle_timer.schedule(tasks::spawn_once(
        Duration::from_secs(options.idle_secs()),
        move || on_idle_elapsed(&monitor),
    ));

    if resuming {
        inner.bus.emit(MonitorEvent::IdleEnd);
    }
    if let Some(keepalive) = inner.keepalive(&options) {
        if resuming {
            keepalive.ping()?;
        }
        keepalive.start()?;
    }
    Ok(())
}

/// Idle-wait timer fired: the idle duration elapsed with no reset.
fn on_idle_elapsed(inner: &Weak<IdleInner>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let options = match inner.options_snapshot() {
        Ok(options) => options,
        Err(err) => {
            error!("idle transition dropped: {err}");
            return;
        }
    };
    let mut state = match inner.state.lock() {
        Ok(state) => state,
        Err(_) => {
            error!("idle transition dropped: state lock poisoned");
            return;
        }
    };
    // Stale fire after a reset or while already idling.
    if !state.running || state.idling {
        return;
    }

    state.idling = true;
    state.idle_timer.cancel();
    inner.bus.emit(MonitorEvent::IdleStart);

    if let Some(keepalive) = inner.keepalive(&options) {
        if let Err(err) = keepalive.stop() {
            error!("failed to pause keepalive heartbeat: {err}");
        }
    }

    if options.timeout_secs() > 0 {
        state.countdown = options.timeout_secs();
        inner.bus.emit(MonitorEvent::IdleWarn(state.countdown));
        let monitor = Arc::downgrade(&inner);
        state.warning_timer.schedule(tasks::spawn_repeating(
            Duration::from_secs(1),
            move || on_warning_tick(&monitor),
        ));
    }
}

/// Warning timer tick: one second of the countdown elapsed.
fn on_warning_tick(inner: &Weak<IdleInner>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut state = match inner.state.lock() {
        Ok(state) => state,
        Err(_) => {
            error!("warning tick dropped: state lock poisoned");
            return;
        }
    };
    // Stale tick after a reset, or an overdue burst tick arriving after the
    // countdown already finished; the relevant cancel has happened already.
    if !state.running || !state.idling || state.countdown == 0 {
        return;
    }

    state.countdown -= 1;
    if state.countdown > 0 {
        inner.bus.emit(MonitorEvent::IdleWarn(state.countdown));
    } else {
        state.warning_timer.cancel();
        inner.bus.emit(MonitorEvent::IdleTimeout);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use tokio::sync::broadcast;
    use tokio::time;

    use crate::config::KeepaliveOptions;

    use super::*;

    /// Test clock reporting the real time skewed by a settable offset,
    /// independent of the paused tokio clock.
    #[derive(Debug, Default)]
    struct SkewClock {
        offset_secs: StdMutex<i64>,
    }

    impl SkewClock {
        fn set_offset(&self, secs: i64) {
            *self.offset_secs.lock().unwrap() = secs;
        }
    }

    impl Clock for SkewClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now() + TimeDelta::seconds(*self.offset_secs.lock().unwrap())
        }
    }

    struct Fixture {
        idle: Idle,
        keepalive: Keepalive,
        clock: Arc<SkewClock>,
        events: broadcast::Receiver<MonitorEvent>,
    }

    fn fixture(options: IdleOptions) -> Fixture {
        fixture_with_interval(options, 600)
    }

    fn fixture_with_interval(options: IdleOptions, interval_secs: u64) -> Fixture {
        let bus = EventBus::default();
        let events = bus.subscribe();
        let clock = Arc::new(SkewClock::default());
        let keepalive = Keepalive::new(
            KeepaliveOptions::default().interval(interval_secs).unwrap(),
            bus.clone(),
        )
        .unwrap();
        let idle = Idle::with_clock(options, Some(keepalive.clone()), bus, clock.clone());
        Fixture {
            idle,
            keepalive,
            clock,
            events,
        }
    }

    fn drain(events: &mut broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance_secs(secs: u64) {
        // Let any freshly spawned timer task be polled so it registers its
        // sleep against the (pre-advance) clock before we jump time forward.
        settle().await;
        time::advance(Duration::from_secs(secs)).await;
        settle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn watch_starts_running_and_the_heartbeat_silently() {
        let mut fx = fixture(IdleOptions::default());
        fx.idle.watch().unwrap();

        assert!(fx.idle.running().unwrap());
        assert!(!fx.idle.idling().unwrap());
        assert!(fx.keepalive.running().unwrap());
        assert!(drain(&mut fx.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn watch_does_not_start_keepalive_when_integration_is_disabled() {
        let fx = fixture(IdleOptions::default().keepalive(false));
        fx.idle.watch().unwrap();

        assert!(fx.idle.running().unwrap());
        assert!(!fx.keepalive.running().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn unwatch_stops_observation_and_cancels_timers() {
        let mut fx = fixture(IdleOptions::default().keepalive(false));
        fx.idle.watch().unwrap();
        fx.idle.unwatch().unwrap();
        assert!(!fx.idle.running().unwrap());

        advance_secs(1200).await;
        assert!(drain(&mut fx.events).is_empty());
        assert!(!fx.idle.idling().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_onset_emits_start_and_pauses_the_heartbeat() {
        let mut fx = fixture_with_interval(
            IdleOptions::default().idle(5).unwrap().timeout(3u64),
            2,
        );
        fx.idle.watch().unwrap();

        advance_secs(2).await;
        assert_eq!(drain(&mut fx.events), vec![MonitorEvent::Keepalive]);
        advance_secs(2).await;
        assert_eq!(drain(&mut fx.events), vec![MonitorEvent::Keepalive]);

        advance_secs(1).await;
        assert_eq!(
            drain(&mut fx.events),
            vec![MonitorEvent::IdleStart, MonitorEvent::IdleWarn(3)]
        );
        assert!(fx.idle.idling().unwrap());
        assert!(!fx.keepalive.running().unwrap());

        // Heartbeat stays paused while idling.
        advance_secs(1).await;
        assert_eq!(drain(&mut fx.events), vec![MonitorEvent::IdleWarn(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_is_left_alone_when_integration_is_disabled() {
        let mut fx = fixture(
            IdleOptions::default()
                .idle(5)
                .unwrap()
                .timeout(3u64)
                .keepalive(false),
        );
        fx.idle.watch().unwrap();
        fx.keepalive.start().unwrap();

        advance_secs(5).await;
        assert!(fx.idle.idling().unwrap());
        assert!(fx.keepalive.running().unwrap());

        fx.idle.watch().unwrap();
        let events = drain(&mut fx.events);
        assert!(events.contains(&MonitorEvent::IdleEnd));
        assert!(!events.contains(&MonitorEvent::Keepalive));
    }

    #[tokio::test(start_paused = true)]
    async fn warning_counts_down_each_second_and_times_out() {
        let mut fx = fixture(
            IdleOptions::default()
                .idle(1200)
                .unwrap()
                .timeout(30u64)
                .keepalive(false),
        );
        fx.idle.watch().unwrap();

        advance_secs(1200).await;
        assert_eq!(
            drain(&mut fx.events),
            vec![MonitorEvent::IdleStart, MonitorEvent::IdleWarn(30)]
        );

        for remaining in (1..30).rev() {
            advance_secs(1).await;
            assert_eq!(drain(&mut fx.events), vec![MonitorEvent::IdleWarn(remaining)]);
        }

        advance_secs(1).await;
        assert_eq!(drain(&mut fx.events), vec![MonitorEvent::IdleTimeout]);
        assert!(fx.idle.idling().unwrap());
        assert!(fx.idle.running().unwrap());

        // No periodic re-emission after the timeout.
        advance_secs(1200).await;
        advance_secs(1200).await;
        assert!(drain(&mut fx.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_warning_ticks_arrive_as_a_burst_without_skips() {
        let mut fx = fixture(
            IdleOptions::default()
                .idle(5)
                .unwrap()
                .timeout(3u64)
                .keepalive(false),
        );
        fx.idle.watch().unwrap();
        advance_secs(5).await;
        assert_eq!(
            drain(&mut fx.events),
            vec![MonitorEvent::IdleStart, MonitorEvent::IdleWarn(3)]
        );

        advance_secs(10).await;
        assert_eq!(
            drain(&mut fx.events),
            vec![
                MonitorEvent::IdleWarn(2),
                MonitorEvent::IdleWarn(1),
                MonitorEvent::IdleTimeout
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_timeout_never_warns_or_times_out() {
        let mut fx = fixture(
            IdleOptions::default()
                .idle(1200)
                .unwrap()
                .timeout(TimeoutSetting::Disabled)
                .keepalive(false),
        );
        fx.idle.watch().unwrap();

        advance_secs(1200).await;
        assert_eq!(drain(&mut fx.events), vec![MonitorEvent::IdleStart]);

        advance_secs(3600).await;
        assert!(drain(&mut fx.events).is_empty());
        assert!(fx.idle.idling().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn resuming_from_idle_emits_end_then_pings_and_restarts_the_heartbeat() {
        let mut fx = fixture(IdleOptions::default().idle(5).unwrap().timeout(3u64));
        fx.idle.watch().unwrap();
        advance_secs(5).await;
        drain(&mut fx.events);
        assert!(!fx.keepalive.running().unwrap());

        fx.idle.watch().unwrap();
        assert_eq!(
            drain(&mut fx.events),
            vec![MonitorEvent::IdleEnd, MonitorEvent::Keepalive]
        );
        assert!(!fx.idle.idling().unwrap());
        assert!(fx.keepalive.running().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_resets_the_idle_wait_when_active() {
        let mut fx = fixture(
            IdleOptions::default()
                .idle(5)
                .unwrap()
                .timeout(3u64)
                .keepalive(false),
        );
        fx.idle.watch().unwrap();

        advance_secs(4).await;
        fx.idle.interrupt().unwrap();
        assert!(drain(&mut fx.events).is_empty());

        // Old deadline passes without an idle onset.
        advance_secs(4).await;
        assert!(drain(&mut fx.events).is_empty());

        advance_secs(1).await;
        let events = drain(&mut fx.events);
        assert_eq!(events.first(), Some(&MonitorEvent::IdleStart));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_while_stopped_is_ignored() {
        let mut fx = fixture(IdleOptions::default().keepalive(false));
        fx.idle.interrupt().unwrap();
        assert!(!fx.idle.running().unwrap());
        assert!(drain(&mut fx.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_interrupt_forces_the_timed_out_state() {
        let mut fx = fixture(IdleOptions::default().idle(1200).unwrap().timeout(30u64));
        fx.idle.watch().unwrap();
        drain(&mut fx.events);

        fx.clock.set_offset(1200 + 30 + 60);
        fx.idle.interrupt().unwrap();

        assert_eq!(drain(&mut fx.events), vec![MonitorEvent::IdleTimeout]);
        assert!(fx.idle.idling().unwrap());
        assert!(!fx.keepalive.running().unwrap());

        // No reset happened: the idle-wait timer is gone for good.
        advance_secs(1200).await;
        assert!(drain(&mut fx.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_interrupt_with_timeout_disabled_resets_instead() {
        let mut fx = fixture(
            IdleOptions::default()
                .idle(1200)
                .unwrap()
                .timeout(TimeoutSetting::Disabled)
                .keepalive(false),
        );
        fx.idle.watch().unwrap();
        fx.clock.set_offset(1200 + 30 + 60);

        fx.idle.interrupt().unwrap();

        assert!(drain(&mut fx.events).is_empty());
        assert!(!fx.idle.idling().unwrap());
        assert!(fx.idle.running().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_while_idling_resumes_when_auto_resume_is_on() {
        let mut fx = fixture(
            IdleOptions::default()
                .idle(5)
                .unwrap()
                .timeout(3u64)
                .keepalive(false),
        );
        fx.idle.watch().unwrap();
        advance_secs(5).await;
        drain(&mut fx.events);
        assert!(fx.idle.idling().unwrap());

        fx.idle.interrupt().unwrap();
        assert_eq!(drain(&mut fx.events), vec![MonitorEvent::IdleEnd]);
        assert!(!fx.idle.idling().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_while_idling_is_ignored_without_auto_resume() {
        let mut fx = fixture(
            IdleOptions::default()
                .idle(5)
                .unwrap()
                .timeout(3u64)
                .auto_resume(false)
                .keepalive(false),
        );
        fx.idle.watch().unwrap();
        advance_secs(5).await;
        drain(&mut fx.events);
        assert!(fx.idle.idling().unwrap());

        fx.idle.interrupt().unwrap();
        assert!(drain(&mut fx.events).is_empty());
        assert!(fx.idle.idling().unwrap());

        // An explicit watch still resumes.
        fx.idle.watch().unwrap();
        assert_eq!(drain(&mut fx.events), vec![MonitorEvent::IdleEnd]);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_tracks_the_absolute_activity_anchor() {
        let fx = fixture(IdleOptions::default().idle(1200).unwrap().timeout(30u64));
        fx.idle.watch().unwrap();
        assert!(!fx.idle.is_expired().unwrap());

        // Exactly at the expiry point.
        fx.clock.set_offset(1230);
        assert!(fx.idle.is_expired().unwrap());

        fx.clock.set_offset(1231);
        assert!(fx.idle.is_expired().unwrap());

        // Far past it (90 days), independent of any tick having fired.
        fx.clock.set_offset(60 * 60 * 24 * 90);
        assert!(fx.idle.is_expired().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn set_idle_applies_immediately_while_running() {
        let mut fx = fixture(
            IdleOptions::default()
                .idle(5)
                .unwrap()
                .timeout(3u64)
                .keepalive(false),
        );
        fx.idle.watch().unwrap();
        fx.idle.set_idle(10).unwrap();
        assert_eq!(fx.idle.options().unwrap().idle_secs(), 10);

        advance_secs(5).await;
        assert!(drain(&mut fx.events).is_empty());

        advance_secs(5).await;
        let events = drain(&mut fx.events);
        assert_eq!(events.first(), Some(&MonitorEvent::IdleStart));
    }

    #[tokio::test(start_paused = true)]
    async fn set_timeout_applies_to_the_next_idle_onset() {
        let mut fx = fixture(
            IdleOptions::default()
                .idle(5)
                .unwrap()
                .timeout(3u64)
                .keepalive(false),
        );
        fx.idle.watch().unwrap();
        fx.idle.set_timeout(7u64).unwrap();

        advance_secs(5).await;
        assert_eq!(
            drain(&mut fx.events),
            vec![MonitorEvent::IdleStart, MonitorEvent::IdleWarn(7)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn setters_do_not_start_a_stopped_monitor() {
        let fx = fixture(IdleOptions::default().keepalive(false));
        fx.idle.set_idle(100).unwrap();
        fx.idle.set_timeout(TimeoutSetting::Disabled).unwrap();

        assert!(!fx.idle.running().unwrap());
        assert_eq!(fx.idle.options().unwrap().idle_secs(), 100);
        assert_eq!(fx.idle.options().unwrap().timeout_secs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn set_idle_rejects_zero() {
        let fx = fixture(IdleOptions::default().keepalive(false));
        assert!(matches!(
            fx.idle.set_idle(0),
            Err(Error::InvalidIdleDuration)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn superseding_watch_cancels_the_prior_idle_wait() {
        let mut fx = fixture(
            IdleOptions::default()
                .idle(5)
                .unwrap()
                .timeout(3u64)
                .keepalive(false),
        );
        fx.idle.watch().unwrap();
        advance_secs(3).await;
        fx.idle.watch().unwrap();

        advance_secs(2).await;
        assert!(drain(&mut fx.events).is_empty());

        advance_secs(3).await;
        let events = drain(&mut fx.events);
        assert_eq!(events.first(), Some(&MonitorEvent::IdleStart));
    }
}

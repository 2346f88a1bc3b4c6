//! Session activity monitor.
//!
//! # States
//! ```text
//! Stopped → Monitoring → Stopped
//! ```
//!
//! While monitoring, every registered interaction signal refreshes
//! `last_activity`, and a periodic check compares the idle gap against the
//! threshold. On breach the monitor tears down (stops, clears sensitive
//! data) and broadcasts [`SessionEvent::Expired`] exactly once.
//!
//! Teardown is not resumable: monitoring restarts only through an explicit
//! `start_monitoring()`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::observability::metrics;
use crate::security::csrf::CsrfManager;
use crate::security::rate_limit::RateLimiter;
use crate::session::activity::{ActivityHub, ActivitySignal, ListenerId};
use crate::session::storage::{SessionStorage, LAST_ACTIVITY_KEY};

/// Notifications for the UI collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session timed out or was rejected; the UI must log the user out.
    Expired,
}

#[derive(Default)]
struct SessionState {
    last_activity: Option<u64>,
    is_monitoring: bool,
    listeners: Vec<ListenerId>,
    ticker: Option<JoinHandle<()>>,
}

type Detached = (Vec<ListenerId>, Option<JoinHandle<()>>);

struct MonitorInner {
    clock: Arc<dyn Clock>,
    storage: Arc<dyn SessionStorage>,
    hub: Arc<ActivityHub>,
    csrf: Arc<CsrfManager>,
    limiter: Arc<RateLimiter>,
    idle_timeout_ms: u64,
    check_interval: Duration,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

/// Tracks user activity and enforces the idle timeout.
#[derive(Clone)]
pub struct SessionMonitor {
    inner: Arc<MonitorInner>,
}

impl SessionMonitor {
    /// Create a stopped monitor, restoring `last_activity` from storage if present.
    pub fn new(
        config: &SessionConfig,
        clock: Arc<dyn Clock>,
        storage: Arc<dyn SessionStorage>,
        hub: Arc<ActivityHub>,
        csrf: Arc<CsrfManager>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let restored = storage
            .get(LAST_ACTIVITY_KEY)
            .and_then(|v| v.parse::<u64>().ok());
        let (events, _) = broadcast::channel(8);

        Self {
            inner: Arc::new(MonitorInner {
                clock,
                storage,
                hub,
                csrf,
                limiter,
                idle_timeout_ms: u64::try_from(config.idle_timeout().as_millis())
                    .unwrap_or(u64::MAX),
                check_interval: config.check_interval(),
                state: Mutex::new(SessionState {
                    last_activity: restored,
                    ..Default::default()
                }),
                events,
            }),
        }
    }

    /// Mark the start of a session (login).
    pub fn begin_session(&self) {
        let now = self.inner.clock.now_millis();
        let mut state = self.inner.state.lock();
        state.last_activity = Some(now);
        self.inner.storage.set(LAST_ACTIVITY_KEY, now.to_string());
    }

    /// Register activity listeners and start the periodic idle check.
    ///
    /// Returns false (and does nothing) if already monitoring. The periodic
    /// check needs a Tokio runtime; without one, hosts call [`check_idle`]
    /// from their own timer.
    ///
    /// [`check_idle`]: SessionMonitor::check_idle
    pub fn start_monitoring(&self) -> bool {
        self.inner.start()
    }

    /// Deregister listeners and cancel the periodic check. Idempotent.
    pub fn stop_monitoring(&self) -> bool {
        let detached = MonitorInner::detach(&mut self.inner.state.lock());
        let stopped = detached.is_some();
        self.inner.release(detached);
        if stopped {
            tracing::debug!("session monitoring stopped");
        }
        stopped
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.state.lock().is_monitoring
    }

    /// A session exists and the idle gap is below the threshold.
    pub fn is_session_valid(&self) -> bool {
        self.inner.is_valid_locked(&self.inner.state.lock())
    }

    /// Explicit refresh, e.g. after a successful request. No-op without a session.
    pub fn update_activity(&self) {
        self.inner.touch();
    }

    pub fn last_activity(&self) -> Option<u64> {
        self.inner.state.lock().last_activity
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.idle_timeout_ms)
    }

    /// Wipe the CSRF token, rate-limiter state and session markers.
    ///
    /// Does not stop monitoring; logout calls both.
    pub fn clear_sensitive_data(&self) {
        self.inner.clear_sensitive();
    }

    /// Body of the periodic check. Returns true if it tore the session down.
    pub fn check_idle(&self) -> bool {
        self.inner.check_idle()
    }

    /// Force teardown and signal expiry, whatever the idle state.
    pub fn expire(&self) {
        self.inner.expire();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }
}

impl MonitorInner {
    fn start(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock();
        if state.is_monitoring {
            return false;
        }
        state.is_monitoring = true;

        if state.last_activity.is_none() {
            let now = self.clock.now_millis();
            state.last_activity = Some(now);
            self.storage.set(LAST_ACTIVITY_KEY, now.to_string());
        }

        for signal in ActivitySignal::ALL {
            let weak = Arc::downgrade(self);
            let id = self.hub.register(
                signal,
                Arc::new(move |_| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_signal();
                    }
                }),
            );
            state.listeners.push(id);
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                state.ticker = Some(handle.spawn(run_idle_checks(
                    Arc::downgrade(self),
                    self.check_interval,
                )));
            }
            Err(_) => {
                tracing::warn!("no Tokio runtime, periodic idle check disabled");
            }
        }

        tracing::info!(
            idle_timeout_ms = self.idle_timeout_ms,
            check_interval_secs = self.check_interval.as_secs(),
            "session monitoring started"
        );
        true
    }

    fn on_signal(&self) {
        if self.state.lock().is_monitoring {
            self.touch();
        }
    }

    fn touch(&self) {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        if let Some(last) = state.last_activity {
            // Never move backwards, even if the clock does.
            let next = last.max(now);
            state.last_activity = Some(next);
            self.storage.set(LAST_ACTIVITY_KEY, next.to_string());
        }
    }

    fn is_valid_locked(&self, state: &SessionState) -> bool {
        match state.last_activity {
            Some(last) => self.clock.now_millis().saturating_sub(last) < self.idle_timeout_ms,
            None => false,
        }
    }

    fn is_monitoring(&self) -> bool {
        self.state.lock().is_monitoring
    }

    /// Leave the Monitoring state, handing back what must be released.
    fn detach(state: &mut SessionState) -> Option<Detached> {
        if !state.is_monitoring {
            return None;
        }
        state.is_monitoring = false;
        Some((std::mem::take(&mut state.listeners), state.ticker.take()))
    }

    fn release(&self, detached: Option<Detached>) {
        let Some((listeners, ticker)) = detached else {
            return;
        };
        for id in listeners {
            self.hub.deregister(id);
        }
        if let Some(ticker) = ticker {
            ticker.abort();
        }
    }

    fn clear_sensitive(&self) {
        self.clear_sensitive_locked(&mut self.state.lock());
    }

    /// Wipe while the caller holds the state lock, so a concurrent
    /// `begin_session` or `stop_monitoring` is ordered entirely before or
    /// after the wipe.
    fn clear_sensitive_locked(&self, state: &mut SessionState) {
        self.csrf.clear();
        self.limiter.clear_all();
        state.last_activity = None;
        self.storage.remove(LAST_ACTIVITY_KEY);
    }

    fn check_idle(&self) -> bool {
        let detached = {
            let mut state = self.state.lock();
            if !state.is_monitoring || self.is_valid_locked(&state) {
                return false;
            }
            let detached = Self::detach(&mut state);
            self.clear_sensitive_locked(&mut state);
            detached
        };
        self.release(detached);

        tracing::warn!(
            idle_timeout_ms = self.idle_timeout_ms,
            "session idle timeout reached, tearing down"
        );
        metrics::record_session_expired();
        let _ = self.events.send(SessionEvent::Expired);
        true
    }

    fn expire(&self) {
        let detached = {
            let mut state = self.state.lock();
            let detached = Self::detach(&mut state);
            self.clear_sensitive_locked(&mut state);
            detached
        };
        self.release(detached);

        tracing::warn!("session expired, forcing logout");
        metrics::record_session_expired();
        let _ = self.events.send(SessionEvent::Expired);
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for id in state.listeners.drain(..) {
            self.hub.deregister(id);
        }
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
    }
}

async fn run_idle_checks(inner: Weak<MonitorInner>, interval: Duration) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.check_idle() || !inner.is_monitoring() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::security::csrf::DEFAULT_HEADER;
    use crate::session::storage::MemoryStorage;
    use reqwest::header::HeaderName;

    struct Fixture {
        monitor: SessionMonitor,
        clock: ManualClock,
        hub: Arc<ActivityHub>,
        csrf: Arc<CsrfManager>,
        limiter: Arc<RateLimiter>,
        storage: Arc<MemoryStorage>,
    }

    fn fixture_with(storage: Arc<MemoryStorage>) -> Fixture {
        let clock = ManualClock::new(1_700_000_000_000);
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let hub = Arc::new(ActivityHub::new());
        let csrf = Arc::new(CsrfManager::new(
            HeaderName::from_static(DEFAULT_HEADER),
            shared_clock.clone(),
            storage.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(shared_clock.clone()));
        let monitor = SessionMonitor::new(
            &SessionConfig::default(),
            shared_clock,
            storage.clone(),
            hub.clone(),
            csrf.clone(),
            limiter.clone(),
        );
        Fixture {
            monitor,
            clock,
            hub,
            csrf,
            limiter,
            storage,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn test_validity_follows_idle_threshold() {
        let f = fixture();
        assert!(!f.monitor.is_session_valid());

        f.monitor.begin_session();
        assert!(f.monitor.is_session_valid());

        f.clock.advance(Duration::from_secs(29 * 60));
        assert!(f.monitor.is_session_valid());

        f.clock.advance(Duration::from_secs(2 * 60));
        assert!(!f.monitor.is_session_valid());
    }

    #[test]
    fn test_update_activity_is_monotonic() {
        let f = fixture();
        f.monitor.begin_session();
        let start = f.monitor.last_activity().unwrap();

        f.clock.advance(Duration::from_secs(10));
        f.monitor.update_activity();
        assert_eq!(f.monitor.last_activity(), Some(start + 10_000));

        f.clock.set(start - 5_000);
        f.monitor.update_activity();
        assert_eq!(f.monitor.last_activity(), Some(start + 10_000));
    }

    #[test]
    fn test_update_without_session_is_noop() {
        let f = fixture();
        f.monitor.update_activity();
        assert!(f.monitor.last_activity().is_none());
    }

    #[test]
    fn test_start_is_not_reentrant() {
        let f = fixture();
        assert!(f.monitor.start_monitoring());
        assert!(!f.monitor.start_monitoring());
        assert_eq!(f.hub.listener_count(), ActivitySignal::ALL.len());
        // Starting creates the session marker when none exists.
        assert!(f.monitor.is_session_valid());
    }

    #[test]
    fn test_signals_refresh_only_while_monitoring() {
        let f = fixture();
        f.monitor.begin_session();
        f.monitor.start_monitoring();

        f.clock.advance(Duration::from_secs(60));
        assert_eq!(f.hub.emit(ActivitySignal::KeyPress), 1);
        let refreshed = f.monitor.last_activity().unwrap();
        assert_eq!(refreshed, f.clock.now_millis());

        assert!(f.monitor.stop_monitoring());
        assert!(!f.monitor.stop_monitoring());
        assert_eq!(f.hub.listener_count(), 0);

        f.clock.advance(Duration::from_secs(60));
        assert_eq!(f.hub.emit(ActivitySignal::Click), 0);
        assert_eq!(f.monitor.last_activity(), Some(refreshed));
    }

    #[test]
    fn test_idle_check_tears_down_exactly_once() {
        let f = fixture();
        let mut events = f.monitor.subscribe();
        f.monitor.begin_session();
        f.monitor.start_monitoring();
        f.csrf.issue();
        assert!(f.limiter.is_allowed("create-user", 5, 60_000));

        f.clock.advance(Duration::from_secs(10 * 60));
        assert!(!f.monitor.check_idle());

        f.clock.advance(Duration::from_secs(21 * 60));
        assert!(f.monitor.check_idle());
        assert!(!f.monitor.check_idle());

        assert!(!f.monitor.is_monitoring());
        assert!(!f.monitor.is_session_valid());
        assert!(f.csrf.current_token().is_none());
        assert_eq!(f.limiter.tracked_keys(), 0);
        assert_eq!(f.hub.listener_count(), 0);
        assert!(f.storage.get(LAST_ACTIVITY_KEY).is_none());

        assert_eq!(events.try_recv().unwrap(), SessionEvent::Expired);
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_relogin_racing_idle_check_survives() {
        for _ in 0..200 {
            let f = fixture();
            f.monitor.begin_session();
            f.monitor.start_monitoring();
            f.clock.advance(Duration::from_secs(31 * 60));

            let barrier = Arc::new(std::sync::Barrier::new(2));
            let checker = {
                let monitor = f.monitor.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    monitor.check_idle()
                })
            };
            barrier.wait();
            f.monitor.begin_session();
            let token = f.csrf.issue();
            checker.join().unwrap();

            // Whichever side won, the fresh session must be intact afterwards.
            assert!(f.monitor.is_session_valid());
            assert_eq!(f.csrf.current_token(), Some(token));
            assert!(f.storage.get(LAST_ACTIVITY_KEY).is_some());
        }
    }

    #[test]
    fn test_clear_sensitive_data_keeps_monitoring() {
        let f = fixture();
        f.monitor.start_monitoring();
        f.csrf.issue();

        f.monitor.clear_sensitive_data();
        assert!(f.monitor.is_monitoring());
        assert!(f.csrf.current_token().is_none());
        assert!(f.monitor.last_activity().is_none());
    }

    #[test]
    fn test_last_activity_restored_from_storage() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(LAST_ACTIVITY_KEY, "1699999999000".to_string());
        let f = fixture_with(storage);
        assert_eq!(f.monitor.last_activity(), Some(1_699_999_999_000));
        assert!(f.monitor.is_session_valid());
    }

    #[test]
    fn test_drop_deregisters_listeners() {
        let f = fixture();
        f.monitor.start_monitoring();
        let hub = f.hub.clone();
        drop(f);
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_check_fires_once() {
        let f = fixture();
        let mut events = f.monitor.subscribe();
        f.monitor.begin_session();
        assert!(f.monitor.start_monitoring());

        f.clock.advance(Duration::from_secs(31 * 60));
        time::sleep(Duration::from_secs(301)).await;

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
        assert!(!f.monitor.is_monitoring());
        assert_eq!(f.hub.listener_count(), 0);

        time::sleep(Duration::from_secs(3600)).await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_check_spares_active_session() {
        let f = fixture();
        let mut events = f.monitor.subscribe();
        f.monitor.start_monitoring();

        for _ in 0..12 {
            f.clock.advance(Duration::from_secs(5 * 60));
            f.hub.emit(ActivitySignal::PointerMove);
            time::sleep(Duration::from_secs(300)).await;
        }

        assert!(f.monitor.is_monitoring());
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}

//! Scan state tracking
//!
//! Turns raw change notifications on the scan state URI into begin/end
//! events. Notifications are handled on a dedicated worker thread: each one
//! re-queries the provider, runs the result through an [`EdgeDetector`] and
//! drives the listener fan-out, so the provider's dispatch thread never
//! blocks on a query or a listener callback.

use crossbeam_channel::{unbounded, Receiver};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::config::NotifyPolicy;
use crate::context::ProviderContext;
use crate::error::ClientError;
use crate::listener::{ListenerRegistry, ScanEvent};
use crate::models::ScanState;
use crate::selection::Selection;
use crate::subscription::ChangeSubscription;

/// Column of the scan state table
pub const STATE_COLUMN: &str = "state";

/// Query the provider's scan state row.
///
/// No row means idle; `state == 1` means scanning.
pub fn query_scan_state(ctx: &dyn ProviderContext, uri: &str) -> Result<ScanState, ClientError> {
    let rows = ctx.query(uri, &Selection::All)?;
    let states = rows.integer_column(uri, STATE_COLUMN)?;
    Ok(states
        .first()
        .map(|state| ScanState::from_code(*state))
        .unwrap_or(ScanState::Idle))
}

/// Same as [`query_scan_state`], reporting failures as idle
pub fn query_scan_state_or_idle(ctx: &dyn ProviderContext, uri: &str) -> ScanState {
    match query_scan_state(ctx, uri) {
        Ok(state) => state,
        Err(e) => {
            warn!("Scan state query failed, assuming idle: {}", e);
            ScanState::Idle
        }
    }
}

/// Decides which event, if any, a freshly observed state produces
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetector {
    policy: NotifyPolicy,
    last: ScanState,
}

impl EdgeDetector {
    /// Create a detector seeded with the last known state
    pub fn new(policy: NotifyPolicy, initial: ScanState) -> Self {
        Self {
            policy,
            last: initial,
        }
    }

    /// Last observed state
    pub fn last(&self) -> ScanState {
        self.last
    }

    /// Record an observation and return the event to deliver
    pub fn observe(&mut self, state: ScanState) -> Option<ScanEvent> {
        let changed = state != self.last;
        self.last = state;

        if self.policy == NotifyPolicy::Transitions && !changed {
            return None;
        }
        Some(match state {
            ScanState::Scanning => ScanEvent::Begin,
            ScanState::Idle => ScanEvent::End,
        })
    }
}

/// Observes the provider's scan state and notifies listeners
pub struct ScanStateTracker {
    ctx: Arc<dyn ProviderContext>,
    uri: String,
    active: Arc<AtomicBool>,
    subscription: Mutex<Option<ChangeSubscription>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ScanStateTracker {
    /// Subscribe to `uri` and start the notification worker
    pub fn start(
        ctx: Arc<dyn ProviderContext>,
        uri: &str,
        policy: NotifyPolicy,
        listeners: Arc<ListenerRegistry>,
    ) -> Result<Self, ClientError> {
        let active = Arc::new(AtomicBool::new(true));
        let (tx, rx) = unbounded();

        // Subscribe before seeding: changes racing the seed query queue up
        // for the worker instead of being lost
        let subscription = ChangeSubscription::start(Arc::clone(&ctx), uri, tx);
        let initial = query_scan_state_or_idle(ctx.as_ref(), uri);

        let worker = {
            let ctx = Arc::clone(&ctx);
            let uri = uri.to_string();
            let active = Arc::clone(&active);
            let detector = EdgeDetector::new(policy, initial);
            thread::Builder::new()
                .name("scan-state-tracker".to_string())
                .spawn(move || run_worker(rx, ctx, uri, detector, listeners, active))?
        };

        info!("Tracking {} (initial state: {})", uri, initial);
        Ok(Self {
            ctx,
            uri: uri.to_string(),
            active,
            subscription: Mutex::new(Some(subscription)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Query the current state; failures count as idle
    pub fn scan_state(&self) -> ScanState {
        query_scan_state_or_idle(self.ctx.as_ref(), &self.uri)
    }

    /// Query whether a scan is running right now
    pub fn is_scanning(&self) -> bool {
        self.scan_state().is_scanning()
    }

    /// Check if notifications are still being delivered
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Unsubscribe and stop the worker; later calls are no-ops.
    ///
    /// No listener is notified once this returns. Safe to call from a
    /// listener callback running on the worker itself.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);

        if let Some(mut subscription) = lock(&self.subscription).take() {
            subscription.stop();
        }

        let Some(handle) = lock(&self.worker).take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            debug!("Tracker stopped from its own worker");
            return;
        }
        if handle.join().is_err() {
            warn!("Scan state worker panicked");
        }
    }
}

impl Drop for ScanStateTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_worker(
    rx: Receiver<()>,
    ctx: Arc<dyn ProviderContext>,
    uri: String,
    mut detector: EdgeDetector,
    listeners: Arc<ListenerRegistry>,
    active: Arc<AtomicBool>,
) {
    debug!("Scan state worker started");

    // Ends when the subscription's sender is released
    while rx.recv().is_ok() {
        if !active.load(Ordering::SeqCst) {
            break;
        }
        info!("Scan state changed");

        let state = query_scan_state_or_idle(ctx.as_ref(), &uri);
        let Some(event) = detector.observe(state) else {
            debug!("Scan state still {}, nothing to notify", state);
            continue;
        };

        if !active.load(Ordering::SeqCst) {
            break;
        }
        listeners.notify(event);
    }

    debug!("Scan state worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::context::{ContentObserver, ObserverId, RowSet};
    use crate::listener::tests::EventListener;
    use crate::provider::SqliteProvider;
    use rusqlite::types::Value;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(3);
    const QUIET: Duration = Duration::from_millis(150);

    /// Provider whose scan state table has no `state` column
    struct WrongColumns;

    impl ProviderContext for WrongColumns {
        fn query(&self, _uri: &str, _selection: &Selection) -> Result<RowSet, ClientError> {
            Ok(RowSet::new(
                vec!["status".to_string()],
                vec![vec![Value::Integer(1)]],
            ))
        }

        fn register_observer(&self, _uri: &str, _observer: Arc<dyn ContentObserver>) -> ObserverId {
            ObserverId(0)
        }

        fn unregister_observer(&self, _id: ObserverId) {}

        fn send_broadcast(&self, _action: &str) -> Result<(), ClientError> {
            Ok(())
        }
    }

    fn setup(policy: NotifyPolicy) -> (Arc<SqliteProvider>, String, ScanStateTracker, Receiver<ScanEvent>) {
        // Long poll interval: only explicit notify_change calls deliver
        let config = ClientConfig::builder().poll_interval_ms(60_000).build();
        let provider = Arc::new(SqliteProvider::open_memory(&config).unwrap());
        let uri = config.scan_state_uri();

        let registry = Arc::new(ListenerRegistry::new());
        let (listener, rx) = EventListener::pair();
        registry.register(listener);

        let tracker = ScanStateTracker::start(provider.clone(), &uri, policy, registry).unwrap();
        (provider, uri, tracker, rx)
    }

    #[test]
    fn test_edge_detector_transitions() {
        let mut detector = EdgeDetector::new(NotifyPolicy::Transitions, ScanState::Idle);
        assert_eq!(detector.observe(ScanState::Idle), None);
        assert_eq!(detector.observe(ScanState::Scanning), Some(ScanEvent::Begin));
        assert_eq!(detector.observe(ScanState::Scanning), None);
        assert_eq!(detector.observe(ScanState::Idle), Some(ScanEvent::End));
        assert_eq!(detector.last(), ScanState::Idle);
    }

    #[test]
    fn test_edge_detector_every_change() {
        let mut detector = EdgeDetector::new(NotifyPolicy::EveryChange, ScanState::Idle);
        assert_eq!(detector.observe(ScanState::Idle), Some(ScanEvent::End));
        assert_eq!(detector.observe(ScanState::Scanning), Some(ScanEvent::Begin));
        assert_eq!(detector.observe(ScanState::Scanning), Some(ScanEvent::Begin));
    }

    #[test]
    fn test_query_scan_state() {
        let config = ClientConfig::default();
        let provider = SqliteProvider::open_memory(&config).unwrap();
        let uri = config.scan_state_uri();

        assert_eq!(query_scan_state(&provider, &uri).unwrap(), ScanState::Idle);
        provider.set_scan_state(ScanState::Scanning).unwrap();
        assert_eq!(query_scan_state(&provider, &uri).unwrap(), ScanState::Scanning);
        provider.set_scan_state_code(7).unwrap();
        assert_eq!(query_scan_state(&provider, &uri).unwrap(), ScanState::Idle);
    }

    #[test]
    fn test_malformed_state_is_idle() {
        assert!(query_scan_state(&WrongColumns, "content://x/scanstate").is_err());
        assert_eq!(
            query_scan_state_or_idle(&WrongColumns, "content://x/scanstate"),
            ScanState::Idle
        );
    }

    #[test]
    fn test_unknown_uri_is_idle() {
        let provider = SqliteProvider::open_memory(&ClientConfig::default()).unwrap();
        assert_eq!(
            query_scan_state_or_idle(&provider, "content://nowhere/scanstate"),
            ScanState::Idle
        );
    }

    #[test]
    fn test_begin_then_end() {
        let (provider, uri, tracker, rx) = setup(NotifyPolicy::Transitions);
        assert!(!tracker.is_scanning());

        provider.set_scan_state(ScanState::Scanning).unwrap();
        assert!(tracker.is_scanning());
        provider.notify_change(&uri);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ScanEvent::Begin);

        provider.set_scan_state(ScanState::Idle).unwrap();
        provider.notify_change(&uri);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ScanEvent::End);
    }

    #[test]
    fn test_redundant_changes_deduplicated() {
        let (provider, uri, _tracker, rx) = setup(NotifyPolicy::Transitions);

        provider.set_scan_state(ScanState::Scanning).unwrap();
        provider.notify_change(&uri);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ScanEvent::Begin);

        // Still scanning: repeated changes produce no second Begin
        provider.notify_change(&uri);
        provider.notify_change(&uri);
        provider.set_scan_state(ScanState::Scanning).unwrap();
        provider.notify_change(&uri);
        assert!(rx.recv_timeout(QUIET).is_err());

        provider.set_scan_state(ScanState::Idle).unwrap();
        provider.notify_change(&uri);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ScanEvent::End);

        provider.notify_change(&uri);
        assert!(rx.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn test_every_change_policy_repeats() {
        let (provider, uri, _tracker, rx) = setup(NotifyPolicy::EveryChange);

        provider.set_scan_state(ScanState::Scanning).unwrap();
        provider.notify_change(&uri);
        provider.notify_change(&uri);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ScanEvent::Begin);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ScanEvent::Begin);
    }

    #[test]
    fn test_seeded_from_current_state() {
        let config = ClientConfig::builder().poll_interval_ms(60_000).build();
        let provider = Arc::new(SqliteProvider::open_memory(&config).unwrap());
        let uri = config.scan_state_uri();
        provider.set_scan_state(ScanState::Scanning).unwrap();

        let registry = Arc::new(ListenerRegistry::new());
        let (listener, rx) = EventListener::pair();
        registry.register(listener);
        let _tracker =
            ScanStateTracker::start(provider.clone(), &uri, NotifyPolicy::Transitions, registry)
                .unwrap();

        // Already scanning when tracking began: the next change ends it
        provider.set_scan_state(ScanState::Idle).unwrap();
        provider.notify_change(&uri);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ScanEvent::End);
        assert!(rx.recv_timeout(QUIET).is_err());
    }

    /// Reports idle to the first query and scanning afterwards, signalling a
    /// change to its observer while answering that first query
    struct FlipsDuringSeed {
        queries: AtomicUsize,
        observer: Mutex<Option<Arc<dyn ContentObserver>>>,
    }

    impl ProviderContext for FlipsDuringSeed {
        fn query(&self, uri: &str, _selection: &Selection) -> Result<RowSet, ClientError> {
            let first = self.queries.fetch_add(1, Ordering::SeqCst) == 0;
            if first {
                if let Some(observer) = lock(&self.observer).clone() {
                    observer.on_change(uri);
                }
            }
            let state = if first { 0 } else { 1 };
            Ok(RowSet::new(
                vec![STATE_COLUMN.to_string()],
                vec![vec![Value::Integer(state)]],
            ))
        }

        fn register_observer(&self, _uri: &str, observer: Arc<dyn ContentObserver>) -> ObserverId {
            *lock(&self.observer) = Some(observer);
            ObserverId(1)
        }

        fn unregister_observer(&self, _id: ObserverId) {
            lock(&self.observer).take();
        }

        fn send_broadcast(&self, _action: &str) -> Result<(), ClientError> {
            Ok(())
        }
    }

    #[test]
    fn test_change_during_seed_query_delivered() {
        let ctx = Arc::new(FlipsDuringSeed {
            queries: AtomicUsize::new(0),
            observer: Mutex::new(None),
        });
        let registry = Arc::new(ListenerRegistry::new());
        let (listener, rx) = EventListener::pair();
        registry.register(listener);

        let _tracker = ScanStateTracker::start(
            ctx,
            "content://test/scanstate",
            NotifyPolicy::Transitions,
            registry,
        )
        .unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ScanEvent::Begin);
    }

    #[test]
    fn test_other_uri_ignored() {
        let (provider, _uri, _tracker, rx) = setup(NotifyPolicy::EveryChange);
        provider.set_scan_state(ScanState::Scanning).unwrap();
        provider.notify_change(&ClientConfig::default().media_uri());
        assert!(rx.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn test_stop_silences_notifications() {
        let (provider, uri, tracker, rx) = setup(NotifyPolicy::EveryChange);
        tracker.stop();
        tracker.stop();
        assert!(!tracker.is_active());
        assert_eq!(provider.observer_count(), 0);

        provider.set_scan_state(ScanState::Scanning).unwrap();
        provider.notify_change(&uri);
        assert!(rx.recv_timeout(QUIET).is_err());

        // Queries still answer after the subscription is gone
        assert!(tracker.is_scanning());
    }

    #[test]
    fn test_watcher_delivers_without_manual_notify() {
        let config = ClientConfig::builder().poll_interval_ms(10).build();
        let provider = Arc::new(SqliteProvider::open_memory(&config).unwrap());
        let registry = Arc::new(ListenerRegistry::new());
        let (listener, rx) = EventListener::pair();
        registry.register(listener);
        let _tracker = ScanStateTracker::start(
            provider.clone(),
            &config.scan_state_uri(),
            NotifyPolicy::Transitions,
            registry,
        )
        .unwrap();

        provider.set_scan_state(ScanState::Scanning).unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), ScanEvent::Begin);
    }
}

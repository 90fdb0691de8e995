//! Scan listeners and their registry

use log::{debug, error, info};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Receives scan begin/end events
pub trait ScanListener: Send + Sync {
    /// A full scan started
    fn on_scan_begin(&self);

    /// A full scan finished
    fn on_scan_end(&self);
}

/// Which callback a fan-out invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    /// [`ScanListener::on_scan_begin`]
    Begin,
    /// [`ScanListener::on_scan_end`]
    End,
}

/// Thread-safe, insertion-ordered set of listeners compared by identity.
///
/// Notification snapshots the set under the lock and invokes callbacks
/// after releasing it, so callbacks may register or unregister listeners.
/// A listener removed while a fan-out is in flight can still receive that
/// one event; it receives none after.
///
/// The registry holds a strong `Arc` for the duration of the registration,
/// so a listener stays alive until it is unregistered or the owning client
/// is dropped, even if the caller released its own handle.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn ScanListener>>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener unless it is already registered.
    ///
    /// Returns true if it was added.
    pub fn register(&self, listener: Arc<dyn ScanListener>) -> bool {
        let mut listeners = self.lock();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            debug!("Listener already registered");
            return false;
        }
        listeners.push(listener);
        info!("Registered scan listener ({} total)", listeners.len());
        true
    }

    /// Remove a listener if present.
    ///
    /// Returns true if it was removed.
    pub fn unregister(&self, listener: &Arc<dyn ScanListener>) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        let removed = listeners.len() != before;
        if removed {
            info!("Unregistered scan listener ({} left)", listeners.len());
        }
        removed
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if no listener is registered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Check whether a listener is registered
    pub fn contains(&self, listener: &Arc<dyn ScanListener>) -> bool {
        self.lock().iter().any(|l| same_listener(l, listener))
    }

    /// Call `on_scan_begin` on every listener
    pub fn notify_begin(&self) -> usize {
        self.notify(ScanEvent::Begin)
    }

    /// Call `on_scan_end` on every listener
    pub fn notify_end(&self) -> usize {
        self.notify(ScanEvent::End)
    }

    /// Deliver an event to a snapshot of the registered listeners.
    ///
    /// A panicking listener is logged and skipped. Returns the number of
    /// listeners whose callback completed.
    pub fn notify(&self, event: ScanEvent) -> usize {
        let snapshot: Vec<Arc<dyn ScanListener>> = self.lock().clone();
        info!("Notify scan {:?} to {} listeners", event, snapshot.len());

        let mut delivered = 0;
        for listener in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| match event {
                ScanEvent::Begin => listener.on_scan_begin(),
                ScanEvent::End => listener.on_scan_end(),
            }));
            match result {
                Ok(()) => delivered += 1,
                Err(_) => error!("Scan listener panicked during {:?}", event),
            }
        }
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn ScanListener>>> {
        // Callbacks never run under this lock
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Identity comparison on the data pointer only
fn same_listener(a: &Arc<dyn ScanListener>, b: &Arc<dyn ScanListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

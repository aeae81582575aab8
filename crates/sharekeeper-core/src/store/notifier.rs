//! Change observers for the session store.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::session::SessionInfo;

type Observer = Arc<dyn Fn(&[SessionInfo]) + Send + Sync>;

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is running a change observer.
pub(crate) fn is_dispatching() -> bool {
    DISPATCHING.with(Cell::get)
}

struct DispatchGuard {
    previous: bool,
}

impl DispatchGuard {
    fn enter() -> Self {
        Self {
            previous: DISPATCHING.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|flag| flag.set(self.previous));
    }
}

/// Registered observers, called synchronously after each mutation.
#[derive(Default)]
pub(crate) struct Notifier {
    observers: Mutex<Vec<(u64, Observer)>>,
    next_id: AtomicU64,
}

impl Notifier {
    pub(crate) fn subscribe<F>(self: &Arc<Self>, observer: F) -> Subscription
    where
        F: Fn(&[SessionInfo]) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(observer)));

        Subscription {
            id,
            notifier: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, id: u64) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Call every observer with `snapshot`.
    ///
    /// Observers registered or removed while dispatching take effect from the
    /// next notification.
    pub(crate) fn notify(&self, snapshot: &[SessionInfo]) {
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        let _guard = DispatchGuard::enter();
        for observer in observers {
            observer(snapshot);
        }
    }
}

/// Handle to a registered observer.
///
/// Dropping the handle keeps the observer registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    notifier: Weak<Notifier>,
}

impl Subscription {
    /// Stop receiving notifications.
    ///
    /// Returns `false` if the observer was already gone.
    pub fn unsubscribe(self) -> bool {
        self.notifier
            .upgrade()
            .is_some_and(|notifier| notifier.unsubscribe(self.id))
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("observers", &self.len())
            .finish()
    }
}

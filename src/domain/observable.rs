//! Observable cell - a latest-value reactive store
//!
//! An [`ObservableCell`] holds one value and synchronously notifies its
//! subscribers whenever the value changes. Only the owner of the cell can
//! write to it; everything else gets a [`CellReader`], which can read the
//! current value and subscribe to changes.
//!
//! There is no buffering: a subscriber sees a `set` only if it was
//! registered when that `set` happened, and subscribing never replays the
//! current value.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Shared<T> {
    value: Mutex<T>,
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone> Shared<T> {
    fn get(&self) -> T {
        lock(&self.value).clone()
    }

    fn subscribe(&self, callback: Callback<T>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.subscribers).push((id, callback));
        id
    }

    fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

trait Unsubscribe: Send + Sync {
    fn remove(&self, id: u64);
}

impl<T: Send> Unsubscribe for Shared<T> {
    fn remove(&self, id: u64) {
        lock(&self.subscribers).retain(|(sub_id, _)| *sub_id != id);
    }
}

/// Writable observable cell, held by exactly one owner
pub struct ObservableCell<T> {
    shared: Arc<Shared<T>>,
}

impl<T> ObservableCell<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn new(initial: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                value: Mutex::new(initial),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.shared.get()
    }

    /// Replace the value.
    ///
    /// Subscribers are notified, in subscription order and before this
    /// returns, only when the new value differs from the old one. Returns
    /// whether the value changed.
    pub fn set(&self, value: T) -> bool {
        match self.replace(value) {
            Some(notification) => {
                notification.notify();
                true
            }
            None => false,
        }
    }

    /// Commit a new value without notifying anyone yet.
    ///
    /// Returns the notification to deliver once the caller has released
    /// its own locks, or `None` when the value did not change.
    pub fn replace(&self, value: T) -> Option<Notification<T>> {
        {
            let mut current = lock(&self.shared.value);
            if *current == value {
                return None;
            }
            *current = value.clone();
        }

        // Snapshot so callbacks run without any cell lock held
        let subscribers = lock(&self.shared.subscribers)
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        Some(Notification { value, subscribers })
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.reader().subscribe(callback)
    }

    /// Read-only handle for observers
    pub fn reader(&self) -> CellReader<T> {
        CellReader {
            shared: self.shared.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscriber_count()
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for ObservableCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableCell")
            .field("value", &self.shared.get())
            .finish()
    }
}

/// A committed change waiting to be delivered to the subscribers that were
/// registered when it was committed
#[must_use = "subscribers are only notified by `notify`"]
pub struct Notification<T> {
    value: T,
    subscribers: Vec<Callback<T>>,
}

impl<T> Notification<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Run every subscriber, in subscription order
    pub fn notify(self) {
        for callback in &self.subscribers {
            callback(&self.value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Notification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("value", &self.value)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Read-only view of an [`ObservableCell`]
pub struct CellReader<T> {
    shared: Arc<Shared<T>>,
}

impl<T> CellReader<T>
where
    T: Clone + Send + 'static,
{
    /// Current value; never blocks on subscribers
    pub fn get(&self) -> T {
        self.shared.get()
    }

    /// Register `callback` for every subsequent change.
    ///
    /// The returned handle removes the callback via
    /// [`Subscription::unsubscribe`]. Dropping the handle keeps the
    /// callback registered.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.shared.subscribe(Arc::new(callback));
        let shared: Arc<dyn Unsubscribe> = self.shared.clone();
        Subscription {
            id,
            cell: Arc::downgrade(&shared),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscriber_count()
    }
}

impl<T> Clone for CellReader<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for CellReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellReader")
            .field("value", &self.shared.get())
            .finish()
    }
}

/// Handle returned by `subscribe`
pub struct Subscription {
    id: u64,
    cell: Weak<dyn Unsubscribe>,
}

impl Subscription {
    /// Stop receiving notifications. Safe to call more than once, and a
    /// no-op once the cell is gone.
    pub fn unsubscribe(&self) {
        if let Some(cell) = self.cell.upgrade() {
            cell.remove(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

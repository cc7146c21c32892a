//! Listener registry shared by state owners that push changes to UI consumers.
//!
//! # Responsibility
//! - Register/detach listeners and hand out `Subscription` capabilities.
//! - Deliver versioned values so one listener never observes an older value
//!   after a newer one.
//!
//! # Invariants
//! - Callbacks are never invoked while any registry or listener lock is held,
//!   so a callback may subscribe, unsubscribe, read owner state or drive the
//!   owner into publishing again.
//! - Values are delivered in the order they were staged. A value published
//!   from inside a callback is delivered once the running flush reaches it,
//!   after the current callback returns.
//! - One listener runs one callback at a time.
//! - A detached listener receives no further deliveries, including ones that
//!   were already in flight when it was detached.
//! - Dropping a `Subscription` does not detach; only `unsubscribe` does.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock_unpoisoned<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct ListenerEntry<T> {
    callback: Callback<T>,
    active: AtomicBool,
    mailbox: Mutex<Mailbox<T>>,
}

struct Mailbox<T> {
    // Highest version handed to the callback so far.
    delivered: u64,
    pending: VecDeque<(u64, T)>,
    // Set while some caller is running the callback for queued values.
    draining: bool,
}

impl<T: Clone> ListenerEntry<T> {
    /// Queues `value` and runs the callback for it unless a delivery to this
    /// listener is already in progress, in which case that caller delivers
    /// it next. Returns whether the value was accepted.
    fn deliver(&self, version: u64, value: &T) -> bool {
        {
            let mut mailbox = lock_unpoisoned(&self.mailbox);
            if !self.active.load(Ordering::Acquire) || version <= mailbox.delivered {
                return false;
            }
            mailbox.pending.push_back((version, value.clone()));
            if mailbox.draining {
                return true;
            }
            mailbox.draining = true;
        }

        let _guard = DrainGuard {
            mailbox: &self.mailbox,
        };
        while let Some(next) = self.next_pending() {
            (self.callback)(&next);
        }
        true
    }

    fn next_pending(&self) -> Option<T> {
        let mut mailbox = lock_unpoisoned(&self.mailbox);
        while let Some((version, value)) = mailbox.pending.pop_front() {
            if self.active.load(Ordering::Acquire) && version > mailbox.delivered {
                mailbox.delivered = version;
                return Some(value);
            }
        }
        mailbox.draining = false;
        None
    }
}

/// Releases the draining flag when a callback panics so later deliveries
/// are not stranded in the queue.
struct DrainGuard<'a, T> {
    mailbox: &'a Mutex<Mailbox<T>>,
}

impl<T> Drop for DrainGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut mailbox = lock_unpoisoned(self.mailbox);
            mailbox.pending.clear();
            mailbox.draining = false;
        }
    }
}

struct RegistryInner<T> {
    next_id: u64,
    entries: BTreeMap<u64, Arc<ListenerEntry<T>>>,
    // Staged values in version order, waiting for the flusher.
    outbox: VecDeque<(u64, T)>,
    flushing: bool,
}

/// Handle to one registered listener, used for the immediate catch-up
/// delivery right after registration.
pub(crate) struct ListenerHandle<T> {
    entry: Arc<ListenerEntry<T>>,
}

impl<T: Clone> ListenerHandle<T> {
    pub(crate) fn deliver(&self, version: u64, value: &T) -> bool {
        self.entry.deliver(version, value)
    }
}

/// Owned registry of change listeners for values of type `T`.
pub struct ListenerRegistry<T> {
    inner: Arc<Mutex<RegistryInner<T>>>,
}

impl<T: Clone + Send + 'static> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                next_id: 1,
                entries: BTreeMap::new(),
                outbox: VecDeque::new(),
                flushing: false,
            })),
        }
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn register<F>(&self, callback: F) -> (ListenerHandle<T>, Subscription)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let entry = Arc::new(ListenerEntry {
            callback: Box::new(callback),
            active: AtomicBool::new(true),
            mailbox: Mutex::new(Mailbox {
                delivered: 0,
                pending: VecDeque::new(),
                draining: false,
            }),
        });

        let id = {
            let mut inner = lock_unpoisoned(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.insert(id, Arc::clone(&entry));
            id
        };

        let registry: Weak<Mutex<RegistryInner<T>>> = Arc::downgrade(&self.inner);
        let detached_entry = Arc::clone(&entry);
        let detach = move || {
            detached_entry.active.store(false, Ordering::Release);
            if let Some(registry) = registry.upgrade() {
                lock_unpoisoned(&registry).entries.remove(&id);
            }
        };

        (
            ListenerHandle { entry },
            Subscription {
                id,
                detach: Mutex::new(Some(Box::new(detach))),
            },
        )
    }

    /// Queues `value` for delivery. Owners call this under their own dispatch
    /// lock so staged versions stay in order, then `flush` once released.
    pub(crate) fn stage(&self, version: u64, value: T) {
        lock_unpoisoned(&self.inner).outbox.push_back((version, value));
    }

    /// Delivers staged values in order to every active listener.
    ///
    /// Returns the number of deliveries this call made. When another call is
    /// already flushing (on another thread, or further up this stack inside a
    /// callback) this returns 0 and that call delivers the values instead.
    pub(crate) fn flush(&self) -> usize {
        {
            let mut inner = lock_unpoisoned(&self.inner);
            if inner.flushing {
                return 0;
            }
            inner.flushing = true;
        }

        let _guard = FlushGuard { inner: &self.inner };
        let mut delivered = 0;
        loop {
            let (version, value, entries) = {
                let mut inner = lock_unpoisoned(&self.inner);
                let Some((version, value)) = inner.outbox.pop_front() else {
                    inner.flushing = false;
                    return delivered;
                };
                let entries: Vec<Arc<ListenerEntry<T>>> =
                    inner.entries.values().cloned().collect();
                (version, value, entries)
            };

            delivered += entries
                .iter()
                .filter(|entry| entry.deliver(version, &value))
                .count();
        }
    }
}

/// Releases the flushing flag when a callback panics so later values are
/// not stranded in the outbox.
struct FlushGuard<'a, T> {
    inner: &'a Mutex<RegistryInner<T>>,
}

impl<T> Drop for FlushGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut inner = lock_unpoisoned(self.inner);
            inner.outbox.clear();
            inner.flushing = false;
        }
    }
}

/// Capability returned by `subscribe`; invoking `unsubscribe` permanently
/// detaches the listener.
pub struct Subscription {
    id: u64,
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Detaches the listener. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        let detach = lock_unpoisoned(&self.detach).take();
        if let Some(detach) = detach {
            detach();
        }
    }

    pub fn is_active(&self) -> bool {
        lock_unpoisoned(&self.detach).is_some()
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

//! Keyed single-flight initialization.
//!
//! The first caller for a key reserves the slot with `Pending(notify)` and runs
//! the initializer. Later callers for the same key wait on the `Notify` and
//! then re-check the slot: on success they read the `Ready` value, on failure
//! the slot is gone and one of them runs the initializer again.

use anyhow::Result;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug)]
enum Slot<V> {
    /// Another task is initializing this key.
    Pending(Arc<Notify>),
    Ready(V),
}

/// Coalesces concurrent initialization of the same key.
///
/// Values are cloned out on every hit, so `V` is usually an `Arc`.
pub struct SingleFlight<K, V> {
    slots: DashMap<K, Slot<V>>,
}

impl<K, V> std::fmt::Debug for SingleFlight<K, V>
where
    K: Eq + Hash + std::fmt::Debug,
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight").field("slots", &self.slots).finish()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Return the ready value for `key`, running `init` at most once across
    /// all concurrent callers.
    ///
    /// If `init` fails (or the initializing task is dropped) the slot is
    /// cleared, waiters are woken, and the error goes to the initializing
    /// caller only.
    pub async fn get_or_try_init<F, Fut>(&self, key: K, init: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let notify = Arc::new(Notify::new());

        loop {
            match self.slots.entry(key.clone()) {
                Entry::Occupied(entry) => match entry.get() {
                    Slot::Ready(value) => return Ok(value.clone()),
                    Slot::Pending(existing) => {
                        let existing = existing.clone();
                        // Must exist before the entry guard is released or a
                        // completion in between would be missed.
                        let notified = existing.notified();
                        drop(entry);
                        notified.await;
                    }
                },
                Entry::Vacant(entry) => {
                    entry.insert(Slot::Pending(notify.clone()));
                    break;
                }
            }
        }

        let guard = PendingGuard {
            slots: &self.slots,
            key: key.clone(),
            notify,
            completed: false,
        };
        let value = init().await?;
        guard.complete(value.clone());
        Ok(value)
    }

    /// The ready value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        self.slots.get(key).and_then(|slot| match slot.value() {
            Slot::Ready(value) => Some(value.clone()),
            Slot::Pending(_) => None,
        })
    }

    /// Forget a ready value. A pending initialization is left alone.
    pub fn remove(&self, key: &K) -> bool {
        self.slots.remove_if(key, |_, slot| matches!(slot, Slot::Ready(_))).is_some()
    }
}

struct PendingGuard<'a, K, V>
where
    K: Eq + Hash,
{
    slots: &'a DashMap<K, Slot<V>>,
    key: K,
    notify: Arc<Notify>,
    completed: bool,
}

impl<K, V> PendingGuard<'_, K, V>
where
    K: Eq + Hash + Clone,
{
    fn complete(mut self, value: V) {
        self.slots.insert(self.key.clone(), Slot::Ready(value));
        self.completed = true;
        self.notify.notify_waiters();
    }
}

impl<K, V> Drop for PendingGuard<'_, K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        self.slots.remove_if(&self.key, |_, slot| {
            matches!(slot, Slot::Pending(n) if Arc::ptr_eq(n, &self.notify))
        });
        self.notify.notify_waiters();
    }
}

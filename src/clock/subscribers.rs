//! Beat subscriber registry.
//!
//! Delivery iterates over a snapshot of the registry, so subscribers may
//! unsubscribe themselves (or each other) from inside a callback. A callback
//! removed mid-delivery is not invoked afterwards, and removal never skips
//! the remaining subscribers.

use super::BeatEvent;
use crate::audio::lock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// A beat callback. The mutex serializes invocations of one callback.
type Callback = Arc<Mutex<Box<dyn FnMut(&BeatEvent) + Send>>>;

#[derive(Default)]
pub(crate) struct SubscriberList {
    entries: Mutex<Vec<(u64, Callback)>>,
    next_id: AtomicU64,
}

impl SubscriberList {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a callback.
    pub(crate) fn subscribe(
        self: &Arc<Self>,
        callback: Box<dyn FnMut(&BeatEvent) + Send>,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).push((id, Arc::new(Mutex::new(callback))));
        Subscription {
            list: Arc::downgrade(self),
            id,
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    fn contains(&self, id: u64) -> bool {
        lock(&self.entries).iter().any(|(entry_id, _)| *entry_id == id)
    }

    pub(crate) fn clear(&self) {
        lock(&self.entries).clear();
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Delivers an event to every subscriber registered at the time of the
    /// call that is still registered when its turn comes.
    pub(crate) fn notify(&self, event: &BeatEvent) {
        let snapshot: Vec<(u64, Callback)> = lock(&self.entries).clone();
        for (id, callback) in snapshot {
            if !self.contains(id) {
                continue;
            }
            let mut callback = lock(&callback);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (&mut **callback)(event)));
            if outcome.is_err() {
                tracing::error!(
                    "Beat subscriber {} panicked on beat {}",
                    id,
                    event.sequence_number
                );
            }
        }
    }
}

/// Handle returned by [`BeatClock::on_beat`](super::BeatClock::on_beat).
///
/// Dropping the handle does not unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe). Safe to call from inside the
/// callback itself, and more than once.
#[derive(Debug, Clone)]
pub struct Subscription {
    list: Weak<SubscriberList>,
    id: u64,
}

impl Subscription {
    /// Removes the callback.
    ///
    /// # Returns
    ///
    /// true if the callback was still registered.
    pub fn unsubscribe(&self) -> bool {
        self.list
            .upgrade()
            .map(|list| list.remove(self.id))
            .unwrap_or(false)
    }

    /// Returns true while the callback is registered.
    pub fn is_active(&self) -> bool {
        self.list
            .upgrade()
            .map(|list| list.contains(self.id))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for SubscriberList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberList")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn event(n: u64) -> BeatEvent {
        BeatEvent {
            sequence_number: n,
            scheduled_audio_time: n as f64,
            delivery_timestamp: 0.0,
        }
    }

    #[test]
    fn test_all_subscribers_receive() {
        let list = SubscriberList::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3 {
            let seen = Arc::clone(&seen);
            list.subscribe(Box::new(move |e| {
                seen.lock().unwrap().push((tag, e.sequence_number));
            }));
        }
        list.notify(&event(7));
        assert_eq!(*seen.lock().unwrap(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn test_self_unsubscribe_during_delivery() {
        let list = SubscriberList::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let own: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());

        let first = {
            let seen = Arc::clone(&seen);
            let own = Arc::clone(&own);
            list.subscribe(Box::new(move |e| {
                seen.lock().unwrap().push(("a", e.sequence_number));
                if let Some(sub) = own.get() {
                    sub.unsubscribe();
                }
            }))
        };
        own.set(first.clone()).unwrap();
        {
            let seen = Arc::clone(&seen);
            list.subscribe(Box::new(move |e| {
                seen.lock().unwrap().push(("b", e.sequence_number));
            }));
        }

        list.notify(&event(0));
        list.notify(&event(1));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("a", 0), ("b", 0), ("b", 1)]
        );
        assert!(!first.is_active());
        assert!(!first.unsubscribe());
    }

    #[test]
    fn test_removed_mid_delivery_is_skipped() {
        let list = SubscriberList::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let victim: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());
        {
            let victim = Arc::clone(&victim);
            list.subscribe(Box::new(move |_| {
                if let Some(sub) = victim.get() {
                    sub.unsubscribe();
                }
            }));
        }
        let second = {
            let seen = Arc::clone(&seen);
            list.subscribe(Box::new(move |e| {
                seen.lock().unwrap().push(e.sequence_number);
            }))
        };
        victim.set(second).unwrap();
        list.notify(&event(0));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let list = SubscriberList::new();
        let seen = Arc::new(Mutex::new(0));
        list.subscribe(Box::new(|_| panic!("boom")));
        {
            let seen = Arc::clone(&seen);
            list.subscribe(Box::new(move |_| *seen.lock().unwrap() += 1));
        }
        list.notify(&event(0));
        list.notify(&event(1));
        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[test]
    fn test_unsubscribe_after_list_dropped() {
        let list = SubscriberList::new();
        let sub = list.subscribe(Box::new(|_| {}));
        drop(list);
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());
    }
}

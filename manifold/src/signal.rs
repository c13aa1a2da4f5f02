use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Handle returned by [`Signal::subscribe`], used to unsubscribe.
pub type SubscriptionId = u64;

type SubscriberFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Single-value publish/subscribe primitive.
///
/// Holds the last emitted value and fans it out synchronously to every
/// subscriber, in subscription order, on the calling thread. There is no
/// queuing and no backpressure. Subscribers are invoked with no internal
/// lock held, so a callback may subscribe, unsubscribe, or emit again.
pub struct Signal<T> {
    value: RwLock<Option<T>>,
    subscribers: RwLock<BTreeMap<SubscriptionId, SubscriberFn<T>>>,
    next_id: AtomicU64,
    disposed: AtomicBool,
}

impl<T: Clone> Signal<T> {
    pub fn new() -> Self {
        Self {
            value: RwLock::new(None),
            subscribers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            disposed: AtomicBool::new(false),
        }
    }

    /// Stores the value and synchronously invokes every current subscriber.
    pub fn emit(&self, value: T) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        *self.value.write().unwrap() = Some(value.clone());
        let subscribers: Vec<SubscriberFn<T>> =
            self.subscribers.read().unwrap().values().cloned().collect();
        for subscriber in subscribers {
            subscriber(&value);
        }
    }

    /// Registers a subscriber, returning a handle for [`Signal::unsubscribe`].
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_with(callback, false)
    }

    /// Registers a subscriber, optionally invoking it immediately with the
    /// current value if one has been emitted.
    pub fn subscribe_with<F>(&self, callback: F, invoke_immediately: bool) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let callback: SubscriberFn<T> = Arc::new(callback);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self.disposed.load(Ordering::Acquire) {
            return id;
        }
        self.subscribers.write().unwrap().insert(id, callback.clone());
        if invoke_immediately {
            let value = self.value.read().unwrap().clone();
            if let Some(value) = value {
                callback(&value);
            }
        }
        id
    }

    /// Removes a subscriber. Returns `false` if the handle is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.write().unwrap().remove(&id).is_some()
    }

    /// Returns a clone of the last emitted value.
    pub fn get(&self) -> Option<T> {
        self.value.read().unwrap().clone()
    }

    /// Releases all subscriber state. Further emits and subscriptions are
    /// silently dropped; the owning module raises its own disposed error
    /// before reaching this layer.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.subscribers.write().unwrap().clear();
        *self.value.write().unwrap() = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl<T: Clone> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

//! Registry of live subscribers, keyed by session key.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{Notify, mpsc};

use crate::{
    RelayError, SessionKey,
    error::DeliveryFailureReason,
    protocol::ServerMessage,
};

/// Identity of one subscriber connection, issued at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle through which the registry reaches one connection.
///
/// Delivery is a non-blocking push into the connection's bounded outbound
/// queue. When the registry drops a subscriber it wakes `evicted` so the
/// connection can shut down.
pub struct Subscriber<M = ServerMessage> {
    id: SubscriberId,
    sender: mpsc::Sender<M>,
    evicted: Arc<Notify>,
}

impl<M> Clone for Subscriber<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            sender: self.sender.clone(),
            evicted: Arc::clone(&self.evicted),
        }
    }
}

impl<M> Subscriber<M> {
    #[must_use]
    pub const fn new(id: SubscriberId, sender: mpsc::Sender<M>, evicted: Arc<Notify>) -> Self {
        Self {
            id,
            sender,
            evicted,
        }
    }

    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    fn deliver(&self, message: M) -> Result<(), RelayError> {
        self.sender.try_send(message).map_err(|e| {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => DeliveryFailureReason::Saturated,
                mpsc::error::TrySendError::Closed(_) => DeliveryFailureReason::Closed,
            };
            RelayError::DeliveryFailure {
                subscriber: self.id,
                reason,
            }
        })
    }
}

/// Result of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

struct Inner<M> {
    by_key: HashMap<SessionKey, HashMap<SubscriberId, Subscriber<M>>>,
    key_of: HashMap<SubscriberId, SessionKey>,
}

impl<M> Inner<M> {
    /// Detach `id` from `key`, dropping the key once its set is empty.
    fn detach(&mut self, id: SubscriberId, key: &SessionKey) -> Option<Subscriber<M>> {
        let set = self.by_key.get_mut(key)?;
        let removed = set.remove(&id);
        if set.is_empty() {
            self.by_key.remove(key);
        }
        removed
    }
}

/// Which connections watch which key.
///
/// A subscriber is associated with at most one key, and keys without
/// subscribers are not retained. Broadcasts run under the shared lock so
/// broadcasts to different keys proceed in parallel; `add` and `remove`
/// take the exclusive lock and so never interleave with a broadcast.
pub struct SubscriberRegistry<M = ServerMessage> {
    inner: RwLock<Inner<M>>,
    delivery_failures: AtomicU64,
}

impl<M> Default for SubscriberRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> SubscriberRegistry<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                by_key: HashMap::new(),
                key_of: HashMap::new(),
            }),
            delivery_failures: AtomicU64::new(0),
        }
    }

    /// Associate `subscriber` with `key`, leaving any previous key first.
    pub fn add(&self, key: SessionKey, subscriber: Subscriber<M>) {
        let id = subscriber.id;
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = inner.key_of.insert(id, key.clone()) {
            if previous != key {
                inner.detach(id, &previous);
                tracing::debug!(subscriber = %id, from = %previous, to = %key, "Subscriber re-targeted");
            }
        }
        inner.by_key.entry(key).or_default().insert(id, subscriber);
    }

    /// Drop `id` from whatever key it watches. Returns that key.
    pub fn remove(&self, id: SubscriberId) -> Option<SessionKey> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let key = inner.key_of.remove(&id)?;
        inner.detach(id, &key);
        Some(key)
    }

    /// Number of subscribers watching `key`.
    #[must_use]
    pub fn count_for(&self, key: &str) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_key
            .get(key)
            .map_or(0, HashMap::len)
    }

    /// Number of subscribers across all keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .key_of
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The key `id` currently watches.
    #[must_use]
    pub fn key_of(&self, id: SubscriberId) -> Option<SessionKey> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .key_of
            .get(&id)
            .cloned()
    }

    /// Deliveries that failed since the registry was created.
    #[must_use]
    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }
}

impl<M: Clone> SubscriberRegistry<M> {
    /// Send `message` to every subscriber of `key`.
    ///
    /// Never blocks and never fails. A subscriber whose queue is full or
    /// closed is removed and told it was evicted; the others still get the
    /// message.
    pub fn broadcast(&self, key: &str, message: &M) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let mut failed = Vec::new();

        {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            let Some(set) = inner.by_key.get(key) else {
                return outcome;
            };
            for subscriber in set.values() {
                match subscriber.deliver(message.clone()) {
                    Ok(()) => outcome.delivered += 1,
                    Err(err) => failed.push((subscriber.id, err)),
                }
            }
        }

        if failed.is_empty() {
            return outcome;
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for (id, err) in failed {
            self.delivery_failures.fetch_add(1, Ordering::Relaxed);
            outcome.dropped += 1;
            tracing::warn!(key = %key, subscriber = %id, error = %err, "Dropping subscriber");

            // It may have re-registered elsewhere since the read lock was released.
            if !inner.key_of.get(&id).is_some_and(|k| k.as_str() == key) {
                continue;
            }
            if let Some(owned) = inner.key_of.remove(&id) {
                if let Some(subscriber) = inner.detach(id, &owned) {
                    subscriber.evicted.notify_one();
                }
            }
        }
        outcome
    }
}

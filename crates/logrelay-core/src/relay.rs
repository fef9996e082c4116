//! Relay orchestration: ingestion, subscription and connection lifecycle.

use std::{
    hash::{BuildHasher, RandomState},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::Serialize;
use tokio::sync::{Notify, mpsc};

use crate::{
    Event, Level, RelayConfig, RelayError, SessionKey, Value,
    protocol::{ClientMessage, IngestRequest, ServerMessage},
    registry::{BroadcastOutcome, Subscriber, SubscriberId, SubscriberRegistry},
    ring_buffer::KeyedRingBuffer,
};

/// Number of locks serialising per-key work.
const KEY_STRIPES: usize = 64;

/// Lifecycle of a subscriber connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected, not watching any key yet.
    Unregistered,
    /// Watching a key.
    Registered(SessionKey),
    /// Disconnected. Terminal.
    Closed,
}

/// One subscriber connection.
///
/// Created by [`RelayCore::connect`]. Dropping it removes the subscriber
/// from the registry, so cleanup happens on every exit path.
pub struct Connection {
    id: SubscriberId,
    state: ConnectionState,
    sender: mpsc::Sender<ServerMessage>,
    evicted: Arc<Notify>,
    registry: Arc<SubscriberRegistry>,
}

impl Connection {
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// The key this connection watches, if registered.
    #[must_use]
    pub const fn key(&self) -> Option<&SessionKey> {
        match &self.state {
            ConnectionState::Registered(key) => Some(key),
            _ => None,
        }
    }

    /// Resolves once the relay has dropped this subscriber for failing to
    /// keep up. The transport should close the socket when it fires.
    pub async fn evicted(&self) {
        self.evicted.notified().await;
    }

    fn subscriber(&self) -> Subscriber {
        Subscriber::new(self.id, self.sender.clone(), Arc::clone(&self.evicted))
    }

    /// Queue a direct reply. Returns false if the queue refused it.
    fn reply(&self, message: ServerMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(subscriber = %self.id, "Failed to queue reply: {e}");
                false
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Counters exposed for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub events_ingested: u64,
    pub delivery_failures: u64,
    pub subscribers: usize,
    pub keys: usize,
}

/// The relay: keyed history plus live fan-out.
///
/// Compound operations on one key (append then broadcast, register then
/// replay, clear then notify) run under that key's stripe lock, so each one
/// is atomic with respect to the others on the same key. Keys hashing to
/// different stripes never wait on each other.
pub struct RelayCore {
    config: RelayConfig,
    buffer: KeyedRingBuffer,
    registry: Arc<SubscriberRegistry>,
    stripes: Box<[Mutex<()>]>,
    hasher: RandomState,
    next_id: AtomicU64,
    events_ingested: AtomicU64,
}

impl RelayCore {
    /// Create a relay.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the config fails validation.
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        Ok(Self {
            config,
            buffer: KeyedRingBuffer::new(config.buffer_capacity)?,
            registry: Arc::new(SubscriberRegistry::new()),
            stripes: (0..KEY_STRIPES).map(|_| Mutex::new(())).collect(),
            hasher: RandomState::new(),
            next_id: AtomicU64::new(1),
            events_ingested: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    #[must_use]
    pub const fn buffer(&self) -> &KeyedRingBuffer {
        &self.buffer
    }

    #[must_use]
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    #[allow(clippy::cast_possible_truncation)]
    fn lock_key(&self, key: &str) -> MutexGuard<'_, ()> {
        let index = (self.hasher.hash_one(key) % KEY_STRIPES as u64) as usize;
        self.stripes[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an event for `key` and fan it out to the key's subscribers.
    ///
    /// Succeeds regardless of how many subscribers there are or whether
    /// they are healthy.
    pub fn ingest(
        &self,
        key: &SessionKey,
        level: Level,
        payload: Vec<Value>,
        timestamp: Option<i64>,
    ) -> Arc<Event> {
        let event = Arc::new(Event::new(level, payload, timestamp));

        let outcome = {
            let _guard = self.lock_key(key.as_str());
            self.buffer.append(key, Arc::clone(&event));
            self.registry
                .broadcast(key.as_str(), &ServerMessage::Log(Arc::clone(&event)))
        };
        self.events_ingested.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            key = %key,
            level = %level,
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            "Event ingested"
        );
        event
    }

    /// Ingest a decoded producer request.
    pub fn ingest_request(&self, request: IngestRequest) -> Arc<Event> {
        self.ingest(
            &request.key,
            request.level,
            request.data,
            request.timestamp,
        )
    }

    /// Open a subscriber connection.
    ///
    /// Returns the connection and the receiving end of its outbound queue.
    pub fn connect(&self) -> (Connection, mpsc::Receiver<ServerMessage>) {
        let id = SubscriberId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.config.subscriber_queue);
        let connection = Connection {
            id,
            state: ConnectionState::Unregistered,
            sender,
            evicted: Arc::new(Notify::new()),
            registry: Arc::clone(&self.registry),
        };
        tracing::info!(subscriber = %id, "Subscriber connected");
        (connection, receiver)
    }

    /// Point `conn` at `key` and send it the key's replay.
    ///
    /// The subscriber joins the broadcast set before the snapshot is taken,
    /// under the key lock, so every event lands either in the replay or in
    /// the live stream after it.
    pub fn register(&self, conn: &mut Connection, key: SessionKey) {
        if conn.state == ConnectionState::Closed {
            tracing::debug!(subscriber = %conn.id, "Ignoring register on closed connection");
            return;
        }

        let replayed = {
            let _guard = self.lock_key(key.as_str());
            self.registry.add(key.clone(), conn.subscriber());
            let buffered_logs = self.buffer.snapshot(key.as_str());
            let replayed = buffered_logs.len();
            let queued = conn.reply(ServerMessage::Registered {
                key: key.clone(),
                buffered_logs,
            });
            if !queued {
                self.registry.remove(conn.id);
            }
            queued.then_some(replayed)
        };

        let Some(replayed) = replayed else {
            // The replay never reached the queue, so the connection is dropped.
            tracing::warn!(subscriber = %conn.id, key = %key, "Replay not queued, evicting subscriber");
            conn.state = ConnectionState::Closed;
            conn.evicted.notify_one();
            return;
        };

        tracing::info!(subscriber = %conn.id, key = %key, replayed, "Subscriber registered");
        conn.state = ConnectionState::Registered(key);
    }

    /// Empty `key`'s history and tell all of its subscribers.
    pub fn clear(&self, key: &SessionKey) -> BroadcastOutcome {
        let outcome = {
            let _guard = self.lock_key(key.as_str());
            self.buffer.clear(key.as_str());
            self.registry.broadcast(key.as_str(), &ServerMessage::Cleared)
        };
        tracing::info!(key = %key, notified = outcome.delivered, "Console cleared");
        outcome
    }

    /// Delete `key`'s history entirely.
    pub fn remove_key(&self, key: &SessionKey) -> bool {
        let _guard = self.lock_key(key.as_str());
        self.buffer.remove(key.as_str())
    }

    /// Handle one text frame from a subscriber.
    ///
    /// A rejected message is answered with an error reply on the same
    /// connection and leaves its state unchanged.
    ///
    /// # Errors
    /// Returns `UnknownSubscriberAction` if the message was rejected.
    pub fn handle_message(&self, conn: &mut Connection, text: &str) -> Result<(), RelayError> {
        match ClientMessage::parse(text) {
            Ok(ClientMessage::Register { key }) => {
                self.register(conn, key);
                Ok(())
            }
            Ok(ClientMessage::Clear { key }) => {
                self.clear(&key);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(subscriber = %conn.id, error = %err, "Rejected client message");
                conn.reply(ServerMessage::error(&err));
                Err(err)
            }
        }
    }

    /// Close `conn` and drop it from the registry. Idempotent.
    pub fn unsubscribe(&self, conn: &mut Connection) {
        if conn.state == ConnectionState::Closed {
            return;
        }
        let key = self.registry.remove(conn.id);
        conn.state = ConnectionState::Closed;
        match key {
            Some(key) => tracing::info!(subscriber = %conn.id, key = %key, "Subscriber closed"),
            None => tracing::info!(subscriber = %conn.id, "Subscriber closed"),
        }
    }

    #[must_use]
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            events_ingested: self.events_ingested.load(Ordering::Relaxed),
            delivery_failures: self.registry.delivery_failures(),
            subscribers: self.registry.len(),
            keys: self.buffer.keys().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn key(name: &str) -> SessionKey {
        SessionKey::new(name).unwrap()
    }

    fn relay(capacity: usize) -> RelayCore {
        RelayCore::new(RelayConfig::with_capacity(capacity)).unwrap()
    }

    fn log(relay: &RelayCore, k: &str, text: &str) -> Arc<Event> {
        relay.ingest(&key(k), Level::Info, vec![text.into()], Some(0))
    }

    fn formatted(events: &[Arc<Event>]) -> Vec<&str> {
        events.iter().map(|e| e.formatted.as_str()).collect()
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            RelayCore::new(RelayConfig::with_capacity(0)),
            Err(RelayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_ingest_keeps_last_events() {
        let relay = relay(2);
        log(&relay, "k", "e1");
        log(&relay, "k", "e2");
        log(&relay, "k", "e3");
        assert_eq!(formatted(&relay.buffer().snapshot("k")), ["e2", "e3"]);
    }

    #[test]
    fn test_ingest_without_subscribers() {
        let relay = relay(10);
        log(&relay, "k", "e1");
        assert_eq!(relay.registry().count_for("k"), 0);
        assert_eq!(relay.buffer().count("k"), 1);
        assert_eq!(relay.stats().events_ingested, 1);
    }

    #[test]
    fn test_exception_formatting_on_ingest() {
        let relay = relay(10);
        let exception = Value::from(json!({
            "_type": "exception",
            "class": "RuntimeException",
            "message": "boom",
            "file": "a.go",
            "line": 10
        }));
        let event = relay.ingest(&key("k"), Level::Error, vec![exception], None);
        assert_eq!(event.formatted, "RuntimeException: boom in a.go:10");
    }

    #[test]
    fn test_register_replays_buffer() {
        let relay = relay(10);
        log(&relay, "x", "e1");
        log(&relay, "x", "e2");

        let (mut conn, mut rx) = relay.connect();
        relay.register(&mut conn, key("x"));

        let Ok(ServerMessage::Registered { key: k, buffered_logs }) = rx.try_recv() else {
            panic!("expected registered message");
        };
        assert_eq!(k.as_str(), "x");
        assert_eq!(formatted(&buffered_logs), ["e1", "e2"]);
        assert_eq!(conn.state(), &ConnectionState::Registered(key("x")));
        assert_eq!(relay.registry().count_for("x"), 1);
    }

    #[test]
    fn test_live_event_delivered_once() {
        let relay = relay(10);
        let (mut conn, mut rx) = relay.connect();
        relay.register(&mut conn, key("x"));
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Registered { .. })));

        let event = log(&relay, "x", "live");
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Log(event));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_keys_are_isolated() {
        let relay = relay(10);
        let (mut conn, mut rx) = relay.connect();
        relay.register(&mut conn, key("a"));
        let _ = rx.try_recv();

        log(&relay, "b", "other");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_re_register_switches_keys() {
        let relay = relay(10);
        let (mut conn, mut rx) = relay.connect();
        relay.register(&mut conn, key("a"));
        relay.register(&mut conn, key("b"));
        while rx.try_recv().is_ok() {}

        log(&relay, "a", "old");
        assert!(rx.try_recv().is_err());
        log(&relay, "b", "new");
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Log(_))));
        assert_eq!(relay.registry().count_for("a"), 0);
    }

    #[test]
    fn test_clear_notifies_every_subscriber() {
        let relay = relay(10);
        log(&relay, "x", "e1");

        let (mut requester, mut rx1) = relay.connect();
        let (mut watcher, mut rx2) = relay.connect();
        relay.register(&mut requester, key("x"));
        relay.register(&mut watcher, key("x"));
        let _ = (rx1.try_recv(), rx2.try_recv());

        relay
            .handle_message(&mut requester, r#"{"action":"clear","key":"x"}"#)
            .unwrap();

        assert_eq!(rx1.try_recv().unwrap(), ServerMessage::Cleared);
        assert_eq!(rx2.try_recv().unwrap(), ServerMessage::Cleared);
        assert!(relay.buffer().snapshot("x").is_empty());
        assert!(relay.buffer().has("x"));
    }

    #[test]
    fn test_rejected_message_leaves_state() {
        let relay = relay(10);
        let (mut conn, mut rx) = relay.connect();

        let err = relay
            .handle_message(&mut conn, r#"{"action":"subscribe","key":"x"}"#)
            .unwrap_err();
        assert!(matches!(err, RelayError::UnknownSubscriberAction(_)));
        assert_eq!(conn.state(), &ConnectionState::Unregistered);
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerMessage::Error {
                error: "Unknown action: subscribe".into()
            }
        );
    }

    #[test]
    fn test_unsubscribe_and_drop_clean_up() {
        let relay = relay(10);
        let (mut a, _rx_a) = relay.connect();
        let (mut b, _rx_b) = relay.connect();
        relay.register(&mut a, key("x"));
        relay.register(&mut b, key("x"));
        assert_eq!(relay.registry().count_for("x"), 2);

        relay.unsubscribe(&mut a);
        assert_eq!(relay.registry().count_for("x"), 1);
        assert_eq!(a.state(), &ConnectionState::Closed);
        relay.unsubscribe(&mut a);
        assert_eq!(relay.registry().count_for("x"), 1);

        drop(b);
        assert_eq!(relay.registry().count_for("x"), 0);
        assert!(relay.registry().is_empty());
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let relay = relay(10);
        let (a, _) = relay.connect();
        let (b, _) = relay.connect();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_register_without_room_for_replay_closes_connection() {
        let relay = RelayCore::new(RelayConfig {
            buffer_capacity: 10,
            subscriber_queue: 1,
        })
        .unwrap();
        let (mut conn, _rx) = relay.connect();
        relay.register(&mut conn, key("a"));
        assert_eq!(conn.state(), &ConnectionState::Registered(key("a")));

        // The first reply still occupies the only queue slot.
        relay.register(&mut conn, key("b"));
        assert_eq!(conn.state(), &ConnectionState::Closed);
        assert_eq!(conn.key(), None);
        assert_eq!(relay.registry().key_of(conn.id()), None);
        assert_eq!(relay.registry().count_for("a"), 0);
        assert_eq!(relay.registry().count_for("b"), 0);

        let mut evicted = tokio_test::task::spawn(conn.evicted());
        tokio_test::assert_ready!(evicted.poll());
        drop(evicted);

        // Closed is terminal.
        relay.register(&mut conn, key("c"));
        assert_eq!(conn.state(), &ConnectionState::Closed);
        assert_eq!(relay.registry().count_for("c"), 0);
    }

    #[test]
    fn test_evicted_pending_until_queue_overflows() {
        let relay = RelayCore::new(RelayConfig {
            buffer_capacity: 10,
            subscriber_queue: 1,
        })
        .unwrap();
        let (mut conn, _rx) = relay.connect();
        relay.register(&mut conn, key("x"));

        let mut evicted = tokio_test::task::spawn(conn.evicted());
        tokio_test::assert_pending!(evicted.poll());

        log(&relay, "x", "overflow");
        assert!(evicted.is_woken());
        tokio_test::assert_ready!(evicted.poll());
    }

    #[tokio::test]
    async fn test_slow_subscriber_evicted_without_stalling_ingest() {
        let relay = RelayCore::new(RelayConfig {
            buffer_capacity: 10,
            subscriber_queue: 1,
        })
        .unwrap();

        let (mut slow, _slow_rx) = relay.connect();
        let (mut fast, mut fast_rx) = relay.connect();
        relay.register(&mut slow, key("x"));
        relay.register(&mut fast, key("x"));
        assert!(matches!(fast_rx.recv().await, Some(ServerMessage::Registered { .. })));

        // The slow queue still holds its registration reply.
        log(&relay, "x", "e1");
        assert!(matches!(fast_rx.recv().await, Some(ServerMessage::Log(_))));

        slow.evicted().await;
        assert_eq!(relay.registry().count_for("x"), 1);
        assert_eq!(relay.stats().delivery_failures, 1);
        assert_eq!(relay.buffer().count("x"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ingest_reaches_subscriber() {
        let relay = Arc::new(
            RelayCore::new(RelayConfig {
                buffer_capacity: 1000,
                subscriber_queue: 1024,
            })
            .unwrap(),
        );
        let (mut conn, mut rx) = relay.connect();
        relay.register(&mut conn, key("x"));
        let _ = rx.recv().await;

        let tasks: Vec<_> = (0..4)
            .map(|t| {
                let relay = Arc::clone(&relay);
                tokio::spawn(async move {
                    for i in 0..50 {
                        log(&relay, "x", &format!("{t}-{i}"));
                        log(&relay, "y", "noise");
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let mut received = Vec::new();
        while let Ok(ServerMessage::Log(event)) = rx.try_recv() {
            received.push(event.formatted.clone());
        }
        assert_eq!(received.len(), 200);

        // Append and broadcast share the key lock, so live order is buffer order.
        let buffered: Vec<_> = relay
            .buffer()
            .snapshot("x")
            .iter()
            .map(|e| e.formatted.clone())
            .collect();
        assert_eq!(received, buffered);

        received.sort();
        received.dedup();
        assert_eq!(received.len(), 200);
    }
}

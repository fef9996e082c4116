//! Bounded per-key event history.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use crate::{Event, RelayError, SessionKey};

type History = Mutex<VecDeque<Arc<Event>>>;

/// Per-key FIFO history with a shared capacity.
///
/// The key map is only write-locked to create or delete entries. Appends to
/// different keys share the map read lock and contend only on their own
/// history.
pub struct KeyedRingBuffer {
    capacity: usize,
    buffers: RwLock<HashMap<SessionKey, Arc<History>>>,
}

impl KeyedRingBuffer {
    /// Create a buffer holding at most `capacity` events per key.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, RelayError> {
        if capacity < 1 {
            return Err(RelayError::InvalidConfig(
                "buffer capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            capacity,
            buffers: RwLock::new(HashMap::new()),
        })
    }

    /// Events retained per key.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event, evicting the oldest once the key is over capacity.
    pub fn append(&self, key: &SessionKey, event: Arc<Event>) {
        {
            let buffers = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(history) = buffers.get(key) {
                self.push(history, event);
                return;
            }
        }

        // First event for this key. Another writer may have created it since
        // the read lock was released, so go through the entry API.
        let mut buffers = self.buffers.write().unwrap_or_else(PoisonError::into_inner);
        let history = buffers
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::with_capacity(self.capacity.min(32)))));
        self.push(history, event);
    }

    fn push(&self, history: &History, event: Arc<Event>) {
        let mut history = history.lock().unwrap_or_else(PoisonError::into_inner);
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Copy of the key's history, oldest first. Empty for unknown keys.
    #[must_use]
    pub fn snapshot(&self, key: &str) -> Vec<Arc<Event>> {
        let buffers = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
        buffers.get(key).map_or_else(Vec::new, |history| {
            history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned()
                .collect()
        })
    }

    /// Empty the key's history. The key itself stays present.
    pub fn clear(&self, key: &str) {
        let buffers = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(history) = buffers.get(key) {
            history.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }

    /// Delete the key entirely. Returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Every key with an entry, cleared ones included.
    #[must_use]
    pub fn keys(&self) -> HashSet<SessionKey> {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Whether the key has an entry.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Number of events held for the key.
    #[must_use]
    pub fn count(&self, key: &str) -> usize {
        let buffers = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
        buffers.get(key).map_or(0, |history| {
            history.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::Level;

    fn key(name: &str) -> SessionKey {
        SessionKey::new(name).unwrap()
    }

    fn event(text: &str) -> Arc<Event> {
        Arc::new(Event::new(Level::Info, vec![text.into()], Some(0)))
    }

    fn texts(events: &[Arc<Event>]) -> Vec<&str> {
        events.iter().map(|e| e.formatted.as_str()).collect()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            KeyedRingBuffer::new(0),
            Err(RelayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_oldest_evicted_first() {
        let buffer = KeyedRingBuffer::new(2).unwrap();
        let k = key("k");
        buffer.append(&k, event("e1"));
        buffer.append(&k, event("e2"));
        buffer.append(&k, event("e3"));
        assert_eq!(texts(&buffer.snapshot("k")), ["e2", "e3"]);
    }

    #[test]
    fn test_keeps_last_n_in_order() {
        let capacity = 5;
        let buffer = KeyedRingBuffer::new(capacity).unwrap();
        let k = key("k");
        for i in 0..capacity + 7 {
            buffer.append(&k, event(&i.to_string()));
        }
        let snapshot = buffer.snapshot("k");
        assert_eq!(snapshot.len(), capacity);
        assert_eq!(texts(&snapshot), ["7", "8", "9", "10", "11"]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let buffer = KeyedRingBuffer::new(3).unwrap();
        let k = key("k");
        buffer.append(&k, event("e1"));
        let snapshot = buffer.snapshot("k");
        buffer.append(&k, event("e2"));
        buffer.clear("k");
        assert_eq!(texts(&snapshot), ["e1"]);
    }

    #[test]
    fn test_unknown_key_reads_empty() {
        let buffer = KeyedRingBuffer::new(3).unwrap();
        assert!(buffer.snapshot("missing").is_empty());
        assert_eq!(buffer.count("missing"), 0);
        assert!(!buffer.has("missing"));
    }

    #[test]
    fn test_clear_keeps_key_remove_drops_it() {
        let buffer = KeyedRingBuffer::new(3).unwrap();
        let k = key("k");
        buffer.append(&k, event("e1"));

        buffer.clear("k");
        assert!(buffer.snapshot("k").is_empty());
        assert!(buffer.has("k"));
        assert_eq!(buffer.count("k"), 0);
        assert!(buffer.keys().contains("k"));

        assert!(buffer.remove("k"));
        assert!(!buffer.has("k"));
        assert!(buffer.keys().is_empty());
        assert!(!buffer.remove("k"));
    }

    #[test]
    fn test_keys_are_independent() {
        let buffer = KeyedRingBuffer::new(1).unwrap();
        buffer.append(&key("a"), event("a1"));
        buffer.append(&key("b"), event("b1"));
        buffer.append(&key("a"), event("a2"));
        assert_eq!(texts(&buffer.snapshot("a")), ["a2"]);
        assert_eq!(texts(&buffer.snapshot("b")), ["b1"]);
    }

    #[test]
    fn test_concurrent_appends_stay_bounded() {
        let buffer = Arc::new(KeyedRingBuffer::new(10).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    let k = key(if t % 2 == 0 { "even" } else { "odd" });
                    for i in 0..100 {
                        buffer.append(&k, event(&format!("{t}-{i}")));
                        assert!(buffer.count(k.as_str()) <= 10);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(buffer.count("even"), 10);
        assert_eq!(buffer.count("odd"), 10);
    }
}

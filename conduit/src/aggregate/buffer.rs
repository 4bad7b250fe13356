use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use conduit_config::shared::BatchConfig;
use tokio::time::Instant;

use crate::aggregate::AddOutcome;

/// An item whose size counts towards the byte limit of an [`AggregationBuffer`].
pub trait BufferItem {
    fn byte_size(&self) -> usize;
}

impl BufferItem for Bytes {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

#[derive(Debug)]
struct BufferEntry<T> {
    items: Vec<T>,
    size: usize,
    /// Time of the first add since the last reset.
    started_at: Option<Instant>,
}

impl<T> Default for BufferEntry<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            size: 0,
            started_at: None,
        }
    }
}

/// A partition-keyed buffer bounded by item count and cumulative byte size.
///
/// Every key owns an independent entry; the empty key is a regular key that
/// callers use for a single global batch. A limit of zero disables it, so a
/// buffer with both limits at zero only empties when the caller resets it.
///
/// The buffer never drops or truncates data: an add that would exceed a limit
/// is rejected with [`AddOutcome::Full`] and the caller must flush and reset
/// the key before adding again. The age limit is not enforced here, callers
/// query [`AggregationBuffer::is_expired`] before adding.
///
/// The buffer does no locking of its own. Concurrent callers guard the whole
/// add, flush and reset sequence with one lock.
#[derive(Debug)]
pub struct AggregationBuffer<T> {
    max_count: usize,
    max_size: usize,
    max_age: Option<Duration>,
    entries: HashMap<String, BufferEntry<T>>,
}

impl<T: BufferItem> AggregationBuffer<T> {
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            max_count: config.count,
            max_size: config.size,
            max_age: config.max_age(),
            entries: HashMap::new(),
        }
    }

    /// Appends `item` to the entry of `key` unless a limit would be exceeded.
    pub fn add(&mut self, key: &str, item: T) -> AddOutcome {
        let item_size = item.byte_size();

        if let Some(entry) = self.entries.get(key) {
            if self.max_count > 0 && entry.items.len() >= self.max_count {
                return AddOutcome::Full;
            }

            if self.max_size > 0 && entry.size + item_size > self.max_size {
                return AddOutcome::Full;
            }
        } else if self.max_size > 0 && item_size > self.max_size {
            return AddOutcome::Full;
        }

        let entry = self.entries.entry(key.to_owned()).or_default();
        entry.started_at.get_or_insert_with(Instant::now);
        entry.size += item_size;
        entry.items.push(item);

        AddOutcome::Added
    }

    /// Returns the buffered items of `key` in insertion order.
    pub fn get(&self, key: &str) -> &[T] {
        self.entries
            .get(key)
            .map(|entry| entry.items.as_slice())
            .unwrap_or_default()
    }

    pub fn count(&self, key: &str) -> usize {
        self.entries.get(key).map_or(0, |entry| entry.items.len())
    }

    /// Returns the cumulative byte size of the items buffered under `key`.
    pub fn size(&self, key: &str) -> usize {
        self.entries.get(key).map_or(0, |entry| entry.size)
    }

    /// Empties the entry of `key`.
    pub fn reset(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Returns every non-empty entry, ordered by key.
    pub fn get_all(&self) -> Vec<(&str, &[T])> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.items.is_empty())
            .map(|(key, entry)| (key.as_str(), entry.items.as_slice()))
            .collect();
        all.sort_by(|(a, _), (b, _)| a.cmp(b));

        all
    }

    /// Returns the keys holding at least one item, ordered by key.
    pub fn keys(&self) -> Vec<String> {
        self.get_all()
            .into_iter()
            .map(|(key, _)| key.to_owned())
            .collect()
    }

    pub fn reset_all(&mut self) {
        self.entries.clear();
    }

    /// Returns `true` if `key` holds items older than the configured age limit.
    pub fn is_expired(&self, key: &str) -> bool {
        let (Some(max_age), Some(entry)) = (self.max_age, self.entries.get(key)) else {
            return false;
        };

        entry
            .started_at
            .is_some_and(|started_at| started_at.elapsed() >= max_age)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|entry| entry.items.is_empty())
    }
}

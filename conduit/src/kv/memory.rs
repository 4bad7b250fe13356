use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ConduitResult;
use crate::kv::KvStore;
use crate::kv::base::not_enabled;

#[derive(Debug)]
struct Entry {
    value: Value,
    /// Expiration in Unix seconds, zero for none.
    ttl: i64,
    /// Recency stamp, higher is more recent.
    last_used: u64,
}

impl Entry {
    fn is_expired(&self, now: i64) -> bool {
        self.ttl != 0 && self.ttl <= now
    }
}

/// Entries plus an index of their recency stamps, oldest first.
#[derive(Debug, Default)]
struct Entries {
    items: HashMap<String, Entry>,
    recency: BTreeMap<u64, String>,
}

impl Entries {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, key: &str) -> Option<&Entry> {
        self.items.get(key)
    }

    fn insert(&mut self, key: String, entry: Entry) {
        self.recency.insert(entry.last_used, key.clone());
        if let Some(replaced) = self.items.insert(key, entry) {
            self.recency.remove(&replaced.last_used);
        }
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.items.remove(key)?;
        self.recency.remove(&entry.last_used);

        Some(entry)
    }

    /// Marks `key` as used at `stamp` and returns its entry.
    fn touch(&mut self, key: &str, stamp: u64) -> Option<&Entry> {
        let entry = self.items.get_mut(key)?;
        self.recency.remove(&entry.last_used);
        self.recency.insert(stamp, key.to_owned());
        entry.last_used = stamp;

        Some(entry)
    }

    /// Removes the least recently used entry and returns its key.
    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        self.items.remove(&key);

        Some(key)
    }
}

#[derive(Debug)]
struct Inner {
    /// `None` until set up and after close.
    entries: Option<Entries>,
    clock: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// An in-memory store evicting the least recently used entry when full.
///
/// Expired entries are removed lazily when read. Closing the store drops every
/// entry.
#[derive(Debug)]
pub struct MemoryKvStore {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl MemoryKvStore {
    pub fn new(capacity: usize) -> Self {
        let inner = Inner {
            entries: None,
            clock: 0,
        };

        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(inner),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.entries.as_ref().map_or(0, Entries::len)
    }

    async fn upsert(
        &self,
        key: &str,
        ttl: i64,
        update: impl FnOnce(Option<Value>) -> Value,
    ) -> ConduitResult<()> {
        let mut inner = self.inner.lock().await;
        let stamp = inner.tick();
        let Some(entries) = inner.entries.as_mut() else {
            return not_enabled();
        };

        let now = Utc::now().timestamp();
        let previous = entries
            .remove(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value);

        if entries.len() >= self.capacity {
            if let Some(oldest) = entries.evict_oldest() {
                debug!(key = %oldest, "evicting least recently used kv entry");
            }
        }

        entries.insert(
            key.to_owned(),
            Entry {
                value: update(previous),
                ttl,
                last_used: stamp,
            },
        );

        Ok(())
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new(conduit_config::shared::DEFAULT_MEMORY_KV_STORE_CAPACITY)
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn setup(&self) -> ConduitResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.entries.is_none() {
            inner.entries = Some(Entries::default());
        }

        Ok(())
    }

    async fn is_enabled(&self) -> bool {
        self.inner.lock().await.entries.is_some()
    }

    async fn get(&self, key: &str) -> ConduitResult<Option<Value>> {
        let mut inner = self.inner.lock().await;
        let stamp = inner.tick();
        let Some(entries) = inner.entries.as_mut() else {
            return not_enabled();
        };

        let now = Utc::now().timestamp();
        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return Ok(None),
        };

        if expired {
            entries.remove(key);
            return Ok(None);
        }

        Ok(entries.touch(key, stamp).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Value) -> ConduitResult<()> {
        self.set_with_ttl(key, value, 0).await
    }

    async fn set_with_ttl(&self, key: &str, value: Value, ttl: i64) -> ConduitResult<()> {
        self.upsert(key, ttl, |_| value).await
    }

    async fn set_add_with_ttl(&self, key: &str, value: Value, ttl: i64) -> ConduitResult<()> {
        self.upsert(key, ttl, |previous| {
            let mut members = match previous {
                Some(Value::Array(members)) => members,
                Some(other) => vec![other],
                None => Vec::new(),
            };

            if !members.contains(&value) {
                members.push(value);
            }

            Value::Array(members)
        })
        .await
    }

    async fn close(&self) -> ConduitResult<()> {
        self.inner.lock().await.entries = None;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    async fn enabled_store(capacity: usize) -> MemoryKvStore {
        let store = MemoryKvStore::new(capacity);
        store.setup().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_setup_is_idempotent() {
        let store = MemoryKvStore::new(4);
        assert!(!store.is_enabled().await);

        store.setup().await.unwrap();
        store.set("a", json!(1)).await.unwrap();
        store.setup().await.unwrap();

        assert!(store.is_enabled().await);
        assert_eq!(store.get("a").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_use_before_setup_fails() {
        let store = MemoryKvStore::new(4);

        let err = store.get("a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KvStoreNotEnabled);
        assert!(store.set("a", json!(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_least_recently_used_entry_is_evicted() {
        let store = enabled_store(2).await;
        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!(2)).await.unwrap();

        // Reading "a" makes "b" the least recently used entry.
        store.get("a").await.unwrap();
        store.set("c", json!(3)).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get("a").await.unwrap(), Some(json!(1)));
        assert_eq!(store.get("b").await.unwrap(), None);
        assert_eq!(store.get("c").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_eviction_follows_use_order_at_capacity() {
        let store = enabled_store(100).await;
        for i in 0..100 {
            store.set(&format!("k{i}"), json!(i)).await.unwrap();
        }
        for i in 0..50 {
            store.get(&format!("k{i}")).await.unwrap();
        }
        for i in 100..150 {
            store.set(&format!("k{i}"), json!(i)).await.unwrap();
        }

        assert_eq!(store.len().await, 100);
        for i in 0..50 {
            assert_eq!(store.get(&format!("k{i}")).await.unwrap(), Some(json!(i)));
        }
        for i in 50..100 {
            assert_eq!(store.get(&format!("k{i}")).await.unwrap(), None);
        }
    }

    #[test]
    fn test_recency_index_stays_in_sync() {
        let mut entries = Entries::default();
        for (stamp, key) in [(1, "a"), (2, "b"), (3, "c")] {
            let entry = Entry {
                value: json!(stamp),
                ttl: 0,
                last_used: stamp,
            };
            entries.insert(key.to_owned(), entry);
        }

        entries.touch("a", 4);
        entries.remove("b");
        assert_eq!(entries.recency.len(), entries.len());

        assert_eq!(entries.evict_oldest().as_deref(), Some("c"));
        assert_eq!(entries.evict_oldest().as_deref(), Some("a"));
        assert_eq!(entries.evict_oldest(), None);
        assert!(entries.items.is_empty());
    }

    #[tokio::test]
    async fn test_overwriting_does_not_evict() {
        let store = enabled_store(2).await;
        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!(2)).await.unwrap();
        store.set("a", json!(10)).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(json!(10)));
        assert_eq!(store.get("b").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_expired_entries_are_removed_on_read() {
        let store = enabled_store(4).await;
        let now = Utc::now().timestamp();
        store.set_with_ttl("past", json!(1), now - 1).await.unwrap();
        store.set_with_ttl("future", json!(2), now + 3600).await.unwrap();

        assert_eq!(store.get("past").await.unwrap(), None);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("future").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_set_add_deduplicates_members() {
        let store = enabled_store(4).await;
        store.set_add("s", json!("x")).await.unwrap();
        store.set_add("s", json!("y")).await.unwrap();
        store.set_add("s", json!("x")).await.unwrap();

        assert_eq!(store.get("s").await.unwrap(), Some(json!(["x", "y"])));
    }

    #[tokio::test]
    async fn test_set_add_updates_the_expiration() {
        let store = enabled_store(4).await;
        let now = Utc::now().timestamp();
        store.set_add_with_ttl("s", json!(1), now + 3600).await.unwrap();
        store.set_add_with_ttl("s", json!(2), now - 1).await.unwrap();

        assert_eq!(store.get("s").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_drops_entries() {
        let store = enabled_store(4).await;
        store.set("a", json!(1)).await.unwrap();
        store.close().await.unwrap();

        assert!(!store.is_enabled().await);
        store.setup().await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }
}

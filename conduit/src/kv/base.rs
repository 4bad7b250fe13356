use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_config::shared::KvStoreConfig;
use serde_json::Value;

use crate::bail;
use crate::error::{ConduitResult, ErrorKind};
use crate::kv::json_file::JsonFileKvStore;
use crate::kv::memory::MemoryKvStore;
use crate::kv::text_file::TextFileKvStore;

/// A key/value store holding JSON values with optional expiration.
///
/// Expirations are absolute Unix timestamps in seconds. A store must be set up
/// before reads and writes; [`KvStore::setup`] is idempotent so callers can
/// invoke it lazily on first use. Read-only stores reject writes with
/// [`ErrorKind::KvStoreOperationNotSupported`].
#[async_trait]
pub trait KvStore: fmt::Debug + Send + Sync {
    /// Loads or connects the store. Does nothing when already set up.
    async fn setup(&self) -> ConduitResult<()>;

    async fn is_enabled(&self) -> bool;

    /// Returns the value of `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> ConduitResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> ConduitResult<()>;

    /// Stores `value` under `key` until the Unix time `ttl`, in seconds.
    async fn set_with_ttl(&self, key: &str, value: Value, ttl: i64) -> ConduitResult<()>;

    /// Adds `value` to the set stored under `key`, ignoring duplicates.
    async fn set_add(&self, key: &str, value: Value) -> ConduitResult<()> {
        self.set_add_with_ttl(key, value, 0).await
    }

    /// Adds `value` to the set stored under `key` and moves the expiration of the set to `ttl`.
    async fn set_add_with_ttl(&self, _key: &str, _value: Value, _ttl: i64) -> ConduitResult<()> {
        bail!(
            ErrorKind::KvStoreOperationNotSupported,
            "The kv store does not support set operations"
        );
    }

    /// Releases the store. A closed store can be set up again.
    async fn close(&self) -> ConduitResult<()>;
}

/// Creates a new store for `config`.
pub fn new_kv_store(config: &KvStoreConfig) -> ConduitResult<Arc<dyn KvStore>> {
    config.validate()?;

    let store: Arc<dyn KvStore> = match config {
        KvStoreConfig::Memory { capacity } => Arc::new(MemoryKvStore::new(*capacity)),
        KvStoreConfig::JsonFile { file } => Arc::new(JsonFileKvStore::new(file.clone())),
        KvStoreConfig::TextFile { file } => Arc::new(TextFileKvStore::new(file.clone())),
    };

    Ok(store)
}

/// Fails with [`ErrorKind::KvStoreOperationNotSupported`] for writes to read-only stores.
pub(crate) fn write_not_supported<T>() -> ConduitResult<T> {
    bail!(
        ErrorKind::KvStoreOperationNotSupported,
        "The kv store is read-only, set is not supported"
    );
}

/// Fails with [`ErrorKind::KvStoreNotEnabled`] for stores used before setup.
pub(crate) fn not_enabled<T>() -> ConduitResult<T> {
    bail!(
        ErrorKind::KvStoreNotEnabled,
        "The kv store must be set up before use"
    );
}

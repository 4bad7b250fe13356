//! Transforms enriching messages from, and recording messages into, a key/value store.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_config::shared::KvStoreTransformConfig;
use metrics::counter;
use serde_json::Value;
use tracing::debug;

use crate::error::ConduitResult;
use crate::kv::{KvStore, TtlPolicy};
use crate::message::{Message, value_to_string};
use crate::metrics::{CONDUIT_KV_STORE_OPERATIONS_TOTAL, OPERATION_LABEL, TRANSFORM_LABEL};
use crate::transform::Transform;

/// State shared by every key/value transform.
struct KvStoreStage {
    id: String,
    source_key: String,
    target_key: String,
    prefix: Option<String>,
    keep_kv_store_open: bool,
    ttl: TtlPolicy,
    store: Arc<dyn KvStore>,
}

impl KvStoreStage {
    fn new(id: String, config: &KvStoreTransformConfig, store: Arc<dyn KvStore>) -> Self {
        Self {
            id,
            source_key: config.object.source_key.clone(),
            target_key: config.object.target_key.clone(),
            prefix: config.prefix.clone().filter(|prefix| !prefix.is_empty()),
            keep_kv_store_open: config.keep_kv_store_open,
            ttl: TtlPolicy::new(config.object.ttl_key.as_deref(), config.ttl_offset_secs),
            store,
        }
    }

    async fn on_control(&self) -> ConduitResult<()> {
        if self.keep_kv_store_open {
            return Ok(());
        }

        debug!(transform = %self.id, "closing kv store");
        self.store.close().await
    }

    /// Sets up the store on first use and returns the store key of `message`.
    ///
    /// Returns `None` when the message has no value at the source key.
    async fn store_key(&self, message: &Message) -> ConduitResult<Option<String>> {
        if !self.store.is_enabled().await {
            self.store.setup().await?;
        }

        let Some(value) = message.get_value(&self.source_key) else {
            return Ok(None);
        };

        let key = value_to_string(&value);
        let key = match &self.prefix {
            Some(prefix) => format!("{prefix}:{key}"),
            None => key,
        };

        Ok(Some(key))
    }

    fn record_operation(&self, operation: &'static str) {
        counter!(
            CONDUIT_KV_STORE_OPERATIONS_TOTAL,
            TRANSFORM_LABEL => self.id.clone(),
            OPERATION_LABEL => operation
        )
        .increment(1);
    }
}

/// Looks up the value at the source key and writes the result to the target key.
///
/// A missing item is written as `null`.
pub struct EnrichKvStoreItemGet {
    stage: KvStoreStage,
}

impl EnrichKvStoreItemGet {
    pub fn new(
        id: impl Into<String>,
        config: &KvStoreTransformConfig,
        store: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            stage: KvStoreStage::new(id.into(), config, store),
        }
    }
}

#[async_trait]
impl Transform for EnrichKvStoreItemGet {
    fn id(&self) -> &str {
        &self.stage.id
    }

    async fn transform(&self, mut message: Message) -> ConduitResult<Vec<Message>> {
        if message.is_control() {
            self.stage.on_control().await?;
            return Ok(vec![message]);
        }

        let Some(key) = self.stage.store_key(&message).await? else {
            return Ok(vec![message]);
        };

        let value = self.stage.store.get(&key).await?;
        self.stage.record_operation("get");
        message.set_value(&self.stage.target_key, value.unwrap_or(Value::Null))?;

        Ok(vec![message])
    }
}

/// Stores the value at the target key under the value at the source key.
pub struct EnrichKvStoreItemSet {
    stage: KvStoreStage,
}

impl EnrichKvStoreItemSet {
    pub fn new(
        id: impl Into<String>,
        config: &KvStoreTransformConfig,
        store: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            stage: KvStoreStage::new(id.into(), config, store),
        }
    }
}

#[async_trait]
impl Transform for EnrichKvStoreItemSet {
    fn id(&self) -> &str {
        &self.stage.id
    }

    async fn transform(&self, message: Message) -> ConduitResult<Vec<Message>> {
        if message.is_control() {
            self.stage.on_control().await?;
            return Ok(vec![message]);
        }

        let Some(key) = self.stage.store_key(&message).await? else {
            return Ok(vec![message]);
        };

        let value = message
            .get_value(&self.stage.target_key)
            .unwrap_or(Value::Null);
        match self.stage.ttl.resolve(&message) {
            Some(ttl) => self.stage.store.set_with_ttl(&key, value, ttl).await?,
            None => self.stage.store.set(&key, value).await?,
        }
        self.stage.record_operation("set");

        Ok(vec![message])
    }
}

/// Adds the value at the target key to the set stored under the value at the source key.
///
/// Only stores supporting set operations can back this transform.
pub struct EnrichKvStoreSetAdd {
    stage: KvStoreStage,
}

impl EnrichKvStoreSetAdd {
    pub fn new(
        id: impl Into<String>,
        config: &KvStoreTransformConfig,
        store: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            stage: KvStoreStage::new(id.into(), config, store),
        }
    }
}

#[async_trait]
impl Transform for EnrichKvStoreSetAdd {
    fn id(&self) -> &str {
        &self.stage.id
    }

    async fn transform(&self, message: Message) -> ConduitResult<Vec<Message>> {
        if message.is_control() {
            self.stage.on_control().await?;
            return Ok(vec![message]);
        }

        let Some(key) = self.stage.store_key(&message).await? else {
            return Ok(vec![message]);
        };

        let value = message
            .get_value(&self.stage.target_key)
            .unwrap_or(Value::Null);
        match self.stage.ttl.resolve(&message) {
            Some(ttl) => {
                self.stage
                    .store
                    .set_add_with_ttl(&key, value, ttl)
                    .await?
            }
            None => self.stage.store.set_add(&key, value).await?,
        }
        self.stage.record_operation("set_add");

        Ok(vec![message])
    }
}

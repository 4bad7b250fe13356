use std::collections::HashMap;
use std::sync::Arc;

use conduit_config::shared::KvStoreConfig;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ConduitResult;
use crate::kv::{KvStore, new_kv_store};

/// Shares store instances between the transforms of a pipeline.
///
/// Transforms configured with equal [`KvStoreConfig`]s receive the same store,
/// so a value written by one transform is visible to the others.
#[derive(Debug, Clone, Default)]
pub struct KvStoreRegistry {
    stores: Arc<Mutex<HashMap<String, Arc<dyn KvStore>>>>,
}

impl KvStoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the store for `config`, creating it on first request.
    pub async fn get_or_create(&self, config: &KvStoreConfig) -> ConduitResult<Arc<dyn KvStore>> {
        let signature = config.signature();
        let mut stores = self.stores.lock().await;

        if let Some(store) = stores.get(&signature) {
            return Ok(store.clone());
        }

        debug!(kind = config.kind(), "creating kv store");
        let store = new_kv_store(config)?;
        stores.insert(signature, store.clone());

        Ok(store)
    }

    pub async fn len(&self) -> usize {
        self.stores.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[tokio::test]
    async fn test_equal_configs_share_a_store() {
        let registry = KvStoreRegistry::new();
        let memory = KvStoreConfig::Memory { capacity: 8 };

        let a = registry.get_or_create(&memory).await.unwrap();
        let b = registry.get_or_create(&memory).await.unwrap();
        let c = registry
            .get_or_create(&KvStoreConfig::Memory { capacity: 16 })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_stores_are_created_without_setup() {
        let registry = KvStoreRegistry::new();
        let store = registry
            .get_or_create(&KvStoreConfig::JsonFile {
                file: PathBuf::from("/does/not/exist.json"),
            })
            .await
            .unwrap();

        assert!(!store.is_enabled().await);
        assert!(store.setup().await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let registry = KvStoreRegistry::new();

        assert!(
            registry
                .get_or_create(&KvStoreConfig::Memory { capacity: 0 })
                .await
                .is_err()
        );
    }
}

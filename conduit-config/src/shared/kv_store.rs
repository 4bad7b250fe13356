use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Default number of entries held by an in-memory store.
pub const DEFAULT_MEMORY_KV_STORE_CAPACITY: usize = 1024;

fn default_capacity() -> usize {
    DEFAULT_MEMORY_KV_STORE_CAPACITY
}

/// Backend selection and options of a key/value store.
///
/// Two transforms configured with an equal [`KvStoreConfig`] share a single
/// store instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KvStoreConfig {
    /// Bounded, least-recently-used in-memory store with lazy expiry.
    Memory {
        #[serde(default = "default_capacity")]
        capacity: usize,
    },
    /// Read-only store loaded from a JSON object.
    JsonFile { file: PathBuf },
    /// Read-only store loaded from a newline-separated list of keys.
    TextFile { file: PathBuf },
}

impl KvStoreConfig {
    /// Returns the identity used to share store instances between transforms.
    pub fn signature(&self) -> String {
        // Every variant holds plain strings and integers, so serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }

    /// Returns the name of the backend.
    pub fn kind(&self) -> &'static str {
        match self {
            KvStoreConfig::Memory { .. } => "memory",
            KvStoreConfig::JsonFile { .. } => "json_file",
            KvStoreConfig::TextFile { .. } => "text_file",
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            KvStoreConfig::Memory { capacity: 0 } => Err(ValidationError::KvStoreCapacityZero),
            _ => Ok(()),
        }
    }
}

impl Default for KvStoreConfig {
    fn default() -> Self {
        KvStoreConfig::Memory {
            capacity: DEFAULT_MEMORY_KV_STORE_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_capacity_defaults() {
        let config: KvStoreConfig = serde_json::from_str(r#"{"type": "memory"}"#).unwrap();

        assert_eq!(
            config,
            KvStoreConfig::Memory {
                capacity: DEFAULT_MEMORY_KV_STORE_CAPACITY
            }
        );
    }

    #[test]
    fn test_equal_configs_share_a_signature() {
        let a: KvStoreConfig =
            serde_json::from_str(r#"{"type": "json_file", "file": "/tmp/a.json"}"#).unwrap();
        let b = KvStoreConfig::JsonFile {
            file: PathBuf::from("/tmp/a.json"),
        };
        let c = KvStoreConfig::TextFile {
            file: PathBuf::from("/tmp/a.json"),
        };

        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.signature(), c.signature());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let config = KvStoreConfig::Memory { capacity: 0 };
        assert_eq!(config.validate(), Err(ValidationError::KvStoreCapacityZero));
    }
}

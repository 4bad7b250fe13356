use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::shared::{BatchConfig, KvStoreConfig, ValidationError};

/// Configuration of a single transform in a pipeline.
///
/// The `type` field selects the transform, the remaining fields are the
/// settings of that transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformConfig {
    SendStdout(SendStdoutConfig),
    SendFile(SendFileConfig),
    SendStream(SendStreamConfig),
    EnrichKvStoreItemGet(KvStoreTransformConfig),
    EnrichKvStoreItemSet(KvStoreTransformConfig),
    EnrichKvStoreSetAdd(KvStoreTransformConfig),
    UtilityControl(UtilityControlConfig),
}

impl TransformConfig {
    /// Returns the type name of the transform.
    pub fn name(&self) -> &'static str {
        match self {
            TransformConfig::SendStdout(_) => "send_stdout",
            TransformConfig::SendFile(_) => "send_file",
            TransformConfig::SendStream(_) => "send_stream",
            TransformConfig::EnrichKvStoreItemGet(_) => "enrich_kv_store_item_get",
            TransformConfig::EnrichKvStoreItemSet(_) => "enrich_kv_store_item_set",
            TransformConfig::EnrichKvStoreSetAdd(_) => "enrich_kv_store_set_add",
            TransformConfig::UtilityControl(_) => "utility_control",
        }
    }

    /// Returns the configured id of the transform, falling back to its type name.
    pub fn id(&self) -> String {
        let id = match self {
            TransformConfig::SendStdout(config) => config.id.as_ref(),
            TransformConfig::SendFile(config) => config.id.as_ref(),
            TransformConfig::SendStream(config) => config.id.as_ref(),
            TransformConfig::EnrichKvStoreItemGet(config)
            | TransformConfig::EnrichKvStoreItemSet(config)
            | TransformConfig::EnrichKvStoreSetAdd(config) => config.id.as_ref(),
            TransformConfig::UtilityControl(config) => config.id.as_ref(),
        };

        id.cloned().unwrap_or_else(|| self.name().to_owned())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let name = self.name();

        match self {
            TransformConfig::SendStdout(_) => Ok(()),
            TransformConfig::SendFile(config) => config.validate(),
            TransformConfig::SendStream(config) => config.validate(),
            TransformConfig::EnrichKvStoreItemGet(config)
            | TransformConfig::EnrichKvStoreItemSet(config)
            | TransformConfig::EnrichKvStoreSetAdd(config) => config.validate(name),
            TransformConfig::UtilityControl(config) => config.validate(),
        }
    }
}

/// Writes batches to standard output, one payload per line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendStdoutConfig {
    #[serde(default)]
    pub id: Option<String>,
    /// Path of the value that partitions data into separate batches.
    #[serde(default)]
    pub batch_key: Option<String>,
    #[serde(default)]
    pub batch: BatchConfig,
}

fn default_file_extension() -> String {
    "jsonl".to_owned()
}

/// Appends batches to newline-delimited files, one file per batch key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendFileConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub batch_key: Option<String>,
    #[serde(default)]
    pub batch: BatchConfig,
    /// Directory the batch files are written to.
    pub directory: PathBuf,
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

impl SendFileConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.directory.as_os_str().is_empty() {
            return Err(ValidationError::MissingOption {
                transform: "send_file",
                option: "directory",
            });
        }

        Ok(())
    }
}

/// Selects which aggregate a streaming record is packed into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKeyPolicy {
    /// All records share one aggregate, which is sent under the partition key of
    /// its first record.
    #[default]
    Global,
    /// Every distinct partition key gets its own aggregate.
    PartitionKey,
}

/// Puts batches of records into a data stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendStreamConfig {
    #[serde(default)]
    pub id: Option<String>,
    /// Name of the destination stream.
    #[serde(default)]
    pub stream: String,
    /// Path of the value used as the partition key. A random key is used per
    /// record when unset or missing from a message.
    #[serde(default)]
    pub partition_key: Option<String>,
    #[serde(default)]
    pub aggregation_key: AggregationKeyPolicy,
    /// Packs multiple payloads into each record.
    #[serde(default)]
    pub enable_record_aggregation: bool,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl SendStreamConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stream.is_empty() {
            return Err(ValidationError::MissingOption {
                transform: "send_stream",
                option: "stream",
            });
        }

        Ok(())
    }
}

/// Message paths read and written by a key/value store transform.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvObjectConfig {
    /// Path of the value used as the store key.
    #[serde(default)]
    pub source_key: String,
    /// Path the looked up value is written to, or the value that is stored.
    #[serde(default)]
    pub target_key: String,
    /// Path of an epoch timestamp used as the item expiration.
    #[serde(default)]
    pub ttl_key: Option<String>,
}

/// Shared settings of the `enrich_kv_store_*` transforms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvStoreTransformConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub object: KvObjectConfig,
    /// Prepended to every store key as `prefix:key`.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Seconds added to the item expiration. Ignored by lookups.
    #[serde(default)]
    pub ttl_offset_secs: u64,
    /// Keeps the store open across control messages, which otherwise close it.
    #[serde(default)]
    pub keep_kv_store_open: bool,
    pub kv_store: KvStoreConfig,
}

impl KvStoreTransformConfig {
    pub fn validate(&self, transform: &'static str) -> Result<(), ValidationError> {
        if self.object.source_key.is_empty() {
            return Err(ValidationError::MissingOption {
                transform,
                option: "object.source_key",
            });
        }

        if self.object.target_key.is_empty() {
            return Err(ValidationError::MissingOption {
                transform,
                option: "object.target_key",
            });
        }

        self.kv_store.validate()
    }
}

/// Emits a control message after every `count` data messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilityControlConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub count: usize,
}

impl UtilityControlConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.count == 0 {
            return Err(ValidationError::ControlIntervalZero);
        }

        Ok(())
    }
}

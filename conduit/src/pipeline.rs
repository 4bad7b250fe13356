//! Pipeline construction and execution.
//!
//! A [`Pipeline`] owns the transforms described by a [`PipelineConfig`] and runs
//! messages through them, either sequentially or with bounded concurrency.

use std::sync::Arc;

use conduit_config::shared::PipelineConfig;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::conduit_error;
use crate::error::{ConduitError, ConduitResult, ErrorKind};
use crate::kv::KvStoreRegistry;
use crate::message::Message;
use crate::metrics::register_metrics;
use crate::transform::{Transform, TransformContext, apply, build_transform};

/// A chain of transforms built from configuration.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    transforms: Arc<Vec<Box<dyn Transform>>>,
    kv_stores: KvStoreRegistry,
}

impl Pipeline {
    /// Builds a pipeline with a fresh [`TransformContext`].
    ///
    /// Pipelines with a `send_stream` transform must be built with
    /// [`Pipeline::with_context`] and a stream client.
    pub async fn new(config: PipelineConfig) -> ConduitResult<Self> {
        Self::with_context(config, TransformContext::default()).await
    }

    /// Builds a pipeline whose transforms share the resources of `context`.
    pub async fn with_context(
        config: PipelineConfig,
        context: TransformContext,
    ) -> ConduitResult<Self> {
        // Safe to call for every pipeline, metrics are described once.
        register_metrics();

        config.validate()?;

        let mut transforms = Vec::with_capacity(config.transforms.len());
        for transform_config in &config.transforms {
            transforms.push(build_transform(transform_config, &context).await?);
        }

        info!(
            transforms = transforms.len(),
            concurrency = config.concurrency,
            "built pipeline"
        );

        Ok(Self {
            config: Arc::new(config),
            transforms: Arc::new(transforms),
            kv_stores: context.kv_stores,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn transforms(&self) -> &[Box<dyn Transform>] {
        &self.transforms
    }

    /// Returns the stores shared by the transforms of this pipeline.
    pub fn kv_stores(&self) -> &KvStoreRegistry {
        &self.kv_stores
    }

    /// Runs `messages` through every transform, one message at a time.
    pub async fn apply(&self, messages: Vec<Message>) -> ConduitResult<Vec<Message>> {
        apply(&self.transforms, messages).await
    }

    /// Sends one control message through the chain, flushing every buffering transform.
    pub async fn flush(&self) -> ConduitResult<Vec<Message>> {
        apply(&self.transforms, vec![Message::control()]).await
    }

    /// Runs data messages through the chain concurrently, then flushes once.
    ///
    /// At most `concurrency` messages are in flight at a time, or all of them
    /// when it is zero. Control messages in `messages` are not run on their
    /// own: the single flush at the end stands in for them, so no buffer is
    /// flushed while data is still in flight.
    ///
    /// Outputs of data messages keep the order of their inputs and are followed
    /// by the output of the flush. When a message fails, every other in-flight
    /// message still completes, the flush is skipped and the first error is
    /// returned.
    pub async fn apply_concurrent(&self, messages: Vec<Message>) -> ConduitResult<Vec<Message>> {
        let permits = (self.config.concurrency > 0)
            .then(|| Arc::new(Semaphore::new(self.config.concurrency)));

        let mut tasks = JoinSet::new();
        for (index, message) in messages.into_iter().enumerate() {
            if message.is_control() {
                continue;
            }

            let transforms = self.transforms.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = match &permits {
                    Some(permits) => Some(permits.clone().acquire_owned().await.map_err(|err| {
                        conduit_error!(ErrorKind::Unknown, "Concurrency limiter closed", err)
                    })?),
                    None => None,
                };

                apply(&transforms, vec![message])
                    .await
                    .map(|output| (index, output))
            });
        }

        let mut outputs = Vec::new();
        let mut errors: Vec<ConduitError> = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(output)) => outputs.push(output),
                Ok(Err(err)) => errors.push(err),
                Err(err) => {
                    error!(error = %err, "transform task did not complete");
                    errors.push(conduit_error!(
                        ErrorKind::Unknown,
                        "Transform task did not complete",
                        err
                    ));
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors.remove(0));
        }

        outputs.sort_by_key(|(index, _)| *index);
        let mut messages: Vec<Message> = outputs
            .into_iter()
            .flat_map(|(_, output)| output)
            .collect();
        messages.extend(self.flush().await?);

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use conduit_config::shared::{
        BatchConfig, KvObjectConfig, KvStoreConfig, KvStoreTransformConfig, SendStdoutConfig,
        TransformConfig, UtilityControlConfig,
    };
    use serde_json::json;

    use super::*;
    use crate::test_utils::message::{json_message, partition_control};

    fn config(concurrency: usize, transforms: Vec<TransformConfig>) -> PipelineConfig {
        PipelineConfig {
            concurrency,
            transforms,
        }
    }

    #[tokio::test]
    async fn test_invalid_config_fails_construction() {
        let result = Pipeline::new(config(0, vec![])).await;
        assert_eq!(result.err().unwrap().kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_send_stream_requires_a_stream_client() {
        let transform = TransformConfig::SendStream(conduit_config::shared::SendStreamConfig {
            stream: "events".to_owned(),
            ..Default::default()
        });

        let result = Pipeline::new(config(0, vec![transform])).await;
        assert_eq!(result.err().unwrap().kind(), ErrorKind::ConfigError);
    }

    #[tokio::test]
    async fn test_flush_emits_exactly_one_control_message() {
        let pipeline = Pipeline::new(config(
            0,
            vec![
                TransformConfig::UtilityControl(UtilityControlConfig { id: None, count: 10 }),
                TransformConfig::SendStdout(SendStdoutConfig {
                    batch: BatchConfig::unbounded(),
                    ..Default::default()
                }),
            ],
        ))
        .await
        .unwrap();

        let output = pipeline.flush().await.unwrap();
        assert_eq!(output, vec![Message::control()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_apply_concurrent_keeps_input_order() {
        let kv = KvStoreTransformConfig {
            id: None,
            object: KvObjectConfig {
                source_key: "id".to_owned(),
                target_key: "seen".to_owned(),
                ttl_key: None,
            },
            prefix: None,
            ttl_offset_secs: 0,
            keep_kv_store_open: false,
            kv_store: KvStoreConfig::default(),
        };
        let pipeline = Pipeline::new(config(
            3,
            vec![TransformConfig::EnrichKvStoreItemGet(kv)],
        ))
        .await
        .unwrap();

        let mut messages: Vec<_> = (0..20).map(|id| json_message(json!({"id": id}))).collect();
        messages.insert(5, Message::control());

        let output = pipeline.apply_concurrent(messages).await.unwrap();
        let (control, data) = partition_control(output);

        assert_eq!(control.len(), 1);
        assert_eq!(data.len(), 20);
        for (id, message) in data.iter().enumerate() {
            assert_eq!(message.get_value("id"), Some(json!(id)));
        }
    }
}

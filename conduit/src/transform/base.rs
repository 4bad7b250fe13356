use std::sync::Arc;

use async_trait::async_trait;
use conduit_config::shared::TransformConfig;
use tracing::error;

use crate::bail;
use crate::error::{ConduitResult, ErrorKind};
use crate::kv::KvStoreRegistry;
use crate::message::Message;
use crate::sink::file::FileSink;
use crate::sink::stdout::StdoutSink;
use crate::sink::stream::StreamClient;
use crate::transform::control::UtilityControl;
use crate::transform::kv_store::{EnrichKvStoreItemGet, EnrichKvStoreItemSet, EnrichKvStoreSetAdd};
use crate::transform::send::SendBatch;
use crate::transform::send_stream::SendStream;

/// A stage of a pipeline.
///
/// Implementations may be called concurrently for different messages and
/// guard their own state.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Returns the id used in logs, metrics and errors.
    fn id(&self) -> &str;

    async fn transform(&self, message: Message) -> ConduitResult<Vec<Message>>;
}

/// Runs `messages` through `transforms` in order.
///
/// The output of each transform is the input of the next one. Returns the first
/// error, after which no further transform runs.
pub async fn apply(
    transforms: &[Box<dyn Transform>],
    messages: Vec<Message>,
) -> ConduitResult<Vec<Message>> {
    let mut messages = messages;

    for transform in transforms {
        if messages.is_empty() {
            break;
        }

        let mut next = Vec::with_capacity(messages.len());
        for message in messages {
            match transform.transform(message).await {
                Ok(output) => next.extend(output),
                Err(err) => {
                    error!(transform = transform.id(), error = %err, "transform failed");
                    return Err(err);
                }
            }
        }

        messages = next;
    }

    Ok(messages)
}

/// Shared resources handed to transforms when they are built.
#[derive(Clone, Default)]
pub struct TransformContext {
    pub kv_stores: KvStoreRegistry,
    pub stream_client: Option<Arc<dyn StreamClient>>,
}

/// Builds the transform described by `config`.
///
/// The configuration is validated first, so missing options fail here rather
/// than on the first message.
pub async fn build_transform(
    config: &TransformConfig,
    context: &TransformContext,
) -> ConduitResult<Box<dyn Transform>> {
    config.validate()?;
    let id = config.id();

    let transform: Box<dyn Transform> = match config {
        TransformConfig::SendStdout(config) => Box::new(SendBatch::new(
            id,
            config.batch_key.clone(),
            &config.batch,
            StdoutSink::new(),
        )?),
        TransformConfig::SendFile(config) => Box::new(SendBatch::new(
            id,
            config.batch_key.clone(),
            &config.batch,
            FileSink::new(config.directory.clone(), config.file_extension.clone()),
        )?),
        TransformConfig::SendStream(config) => {
            let Some(client) = context.stream_client.clone() else {
                bail!(
                    ErrorKind::ConfigError,
                    "A stream client is required to build the transform",
                    id
                );
            };

            Box::new(SendStream::new(id, config, client)?)
        }
        TransformConfig::EnrichKvStoreItemGet(config) => {
            let store = context.kv_stores.get_or_create(&config.kv_store).await?;
            Box::new(EnrichKvStoreItemGet::new(id, config, store))
        }
        TransformConfig::EnrichKvStoreItemSet(config) => {
            let store = context.kv_stores.get_or_create(&config.kv_store).await?;
            Box::new(EnrichKvStoreItemSet::new(id, config, store))
        }
        TransformConfig::EnrichKvStoreSetAdd(config) => {
            let store = context.kv_stores.get_or_create(&config.kv_store).await?;
            Box::new(EnrichKvStoreSetAdd::new(id, config, store))
        }
        TransformConfig::UtilityControl(config) => Box::new(UtilityControl::new(id, config.count)),
    };

    Ok(transform)
}

use async_trait::async_trait;
use bytes::Bytes;
use conduit_config::shared::BatchConfig;

use crate::dispatch::KeyedDispatcher;
use crate::error::ConduitResult;
use crate::message::{Message, value_to_string};
use crate::sink::Sink;
use crate::transform::Transform;

/// Buffers message payloads and sends them to a sink in batches.
///
/// Payloads are grouped by the value at `batch_key`; messages without it, or
/// all messages when no batch key is configured, share the global batch.
/// Data messages are passed through after buffering. A control message
/// flushes every batch before it is passed through.
pub struct SendBatch<S> {
    id: String,
    batch_key: Option<String>,
    dispatcher: KeyedDispatcher<Bytes, S>,
}

impl<S: Sink + 'static> SendBatch<S> {
    pub fn new(
        id: impl Into<String>,
        batch_key: Option<String>,
        config: &BatchConfig,
        sink: S,
    ) -> ConduitResult<Self> {
        let id = id.into();
        let dispatcher = KeyedDispatcher::new(id.clone(), config, sink)?;

        Ok(Self {
            id,
            batch_key,
            dispatcher,
        })
    }

    pub fn sink(&self) -> &S {
        self.dispatcher.sink()
    }

    fn batch_key_of(&self, message: &Message) -> String {
        self.batch_key
            .as_deref()
            .and_then(|path| message.get_value(path))
            .map(|value| value_to_string(&value))
            .unwrap_or_default()
    }
}

#[async_trait]
impl<S: Sink + 'static> Transform for SendBatch<S> {
    fn id(&self) -> &str {
        &self.id
    }

    async fn transform(&self, message: Message) -> ConduitResult<Vec<Message>> {
        if message.is_control() {
            self.dispatcher.flush_all().await?;
            return Ok(vec![message]);
        }

        let key = self.batch_key_of(&message);
        self.dispatcher.add(&key, message.data().clone()).await?;

        Ok(vec![message])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::sink::memory::MemorySink;
    use crate::test_utils::message::json_message;
    use crate::test_utils::sink::TestSinkWrapper;

    fn config(count: usize) -> BatchConfig {
        BatchConfig {
            count,
            size: 0,
            duration_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_control_flushes_every_non_empty_key() {
        let sink = TestSinkWrapper::wrap(MemorySink::new());
        let transform =
            SendBatch::new("send", Some("key".to_owned()), &config(10), sink.clone()).unwrap();

        for _ in 0..3 {
            transform
                .transform(json_message(json!({"key": "a"})))
                .await
                .unwrap();
        }

        let output = transform.transform(Message::control()).await.unwrap();
        assert_eq!(output, vec![Message::control()]);

        let sends = sink.sends().await;
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, "a");
        assert_eq!(sends[0].1.len(), 3);

        // Nothing is left to flush.
        transform.transform(Message::control()).await.unwrap();
        assert_eq!(sink.sends().await.len(), 1);
    }

    #[tokio::test]
    async fn test_data_messages_are_passed_through() {
        let sink = MemorySink::new();
        let transform = SendBatch::new("send", None, &config(0), sink.clone()).unwrap();
        let message = json_message(json!({"a": 1}));

        let output = transform.transform(message.clone()).await.unwrap();
        assert_eq!(output, vec![message]);
        assert!(sink.batches().await.is_empty());
    }

    #[tokio::test]
    async fn test_messages_without_the_key_share_the_global_batch() {
        let sink = MemorySink::new();
        let transform =
            SendBatch::new("send", Some("tenant".to_owned()), &config(0), sink.clone()).unwrap();

        transform
            .transform(json_message(json!({"tenant": 7})))
            .await
            .unwrap();
        transform.transform(Message::from_data("raw")).await.unwrap();
        transform.transform(Message::control()).await.unwrap();

        let keys: Vec<_> = sink
            .batches()
            .await
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["".to_owned(), "7".to_owned()]);
    }

    #[tokio::test]
    async fn test_failed_control_flush_surfaces_the_error() {
        let sink = TestSinkWrapper::wrap(MemorySink::new());
        let transform = SendBatch::new("send", None, &config(0), sink.clone()).unwrap();
        transform.transform(Message::from_data("a")).await.unwrap();
        sink.fail_next_sends(1).await;

        let err = transform.transform(Message::control()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationError);

        let output = transform.transform(Message::control()).await.unwrap();
        assert_eq!(output.len(), 1);
        assert_eq!(sink.sends().await.len(), 1);
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use conduit_config::shared::{AggregationKeyPolicy, SendStreamConfig};
use uuid::Uuid;

use crate::aggregate::truncate_partition_key;
use crate::bail;
use crate::dispatch::KeyedDispatcher;
use crate::error::{ConduitResult, ErrorKind};
use crate::message::{Message, value_to_string};
use crate::sink::stream::{
    MAX_BYTES_PER_PUT, MAX_RECORD_SIZE, MAX_RECORDS_PER_PUT, StreamClient, StreamRecord,
    StreamSink,
};
use crate::transform::Transform;

/// Puts message payloads into a data stream.
///
/// Each payload is sent with the partition key read from the message, or a
/// random key when none is configured or the message lacks it. With
/// [`AggregationKeyPolicy::Global`] all records share one batch. With
/// [`AggregationKeyPolicy::PartitionKey`] every partition key is batched, and
/// aggregated, on its own, which keeps records of one key together at the
/// cost of smaller batches when keys are numerous.
pub struct SendStream {
    id: String,
    partition_key: Option<String>,
    aggregation_key: AggregationKeyPolicy,
    dispatcher: KeyedDispatcher<StreamRecord, StreamSink>,
}

impl SendStream {
    pub fn new(
        id: impl Into<String>,
        config: &SendStreamConfig,
        client: Arc<dyn StreamClient>,
    ) -> ConduitResult<Self> {
        config.validate()?;

        let id = id.into();
        let sink = StreamSink::new(
            config.stream.clone(),
            client,
            config.enable_record_aggregation,
        );

        // Aggregated records pack many payloads, so only raw records are capped by count.
        let max_count = if config.enable_record_aggregation {
            usize::MAX
        } else {
            MAX_RECORDS_PER_PUT
        };
        let batch = config.batch.clamp(max_count, MAX_BYTES_PER_PUT);

        let dispatcher = KeyedDispatcher::new(id.clone(), &batch, sink)?;

        Ok(Self {
            id,
            partition_key: config.partition_key.clone(),
            aggregation_key: config.aggregation_key,
            dispatcher,
        })
    }

    fn partition_key_of(&self, message: &Message) -> String {
        let key = self
            .partition_key
            .as_deref()
            .and_then(|path| message.get_value(path))
            .map(|value| value_to_string(&value))
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        truncate_partition_key(&key).to_owned()
    }
}

#[async_trait]
impl Transform for SendStream {
    fn id(&self) -> &str {
        &self.id
    }

    async fn transform(&self, message: Message) -> ConduitResult<Vec<Message>> {
        if message.is_control() {
            self.dispatcher.flush_all().await?;
            return Ok(vec![message]);
        }

        let size = message.data().len();
        if size > MAX_RECORD_SIZE {
            bail!(
                ErrorKind::RecordTooLarge,
                "Payload exceeds the stream record limit",
                format!("{size} bytes, limit is {MAX_RECORD_SIZE} bytes")
            );
        }

        let partition_key = self.partition_key_of(&message);
        let batch_key = match self.aggregation_key {
            AggregationKeyPolicy::Global => String::new(),
            AggregationKeyPolicy::PartitionKey => partition_key.clone(),
        };

        self.dispatcher
            .add(&batch_key, StreamRecord::new(partition_key, message.data().clone()))
            .await?;

        Ok(vec![message])
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use conduit_config::shared::BatchConfig;
    use serde_json::json;

    use super::*;
    use crate::aggregate::{MAX_PARTITION_KEY_LENGTH, RecordAggregate};
    use crate::sink::stream::MemoryStreamClient;
    use crate::test_utils::message::json_message;

    fn stream_config(
        aggregation_key: AggregationKeyPolicy,
        enable_record_aggregation: bool,
    ) -> SendStreamConfig {
        SendStreamConfig {
            id: None,
            stream: "events".to_owned(),
            partition_key: Some("pk".to_owned()),
            aggregation_key,
            enable_record_aggregation,
            batch: BatchConfig::unbounded(),
        }
    }

    #[tokio::test]
    async fn test_oversized_payload_is_rejected() {
        let client = MemoryStreamClient::new();
        let transform = SendStream::new(
            "stream",
            &stream_config(AggregationKeyPolicy::Global, false),
            Arc::new(client.clone()),
        )
        .unwrap();

        let err = transform
            .transform(Message::from_data(vec![0u8; MAX_RECORD_SIZE + 1]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecordTooLarge);

        transform
            .transform(Message::from_data(vec![0u8; MAX_RECORD_SIZE]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_raw_records_keep_their_partition_keys() {
        let client = MemoryStreamClient::new();
        let transform = SendStream::new(
            "stream",
            &stream_config(AggregationKeyPolicy::Global, false),
            Arc::new(client.clone()),
        )
        .unwrap();

        for pk in ["a", "b", "a"] {
            transform
                .transform(json_message(json!({"pk": pk})))
                .await
                .unwrap();
        }
        transform.transform(Message::control()).await.unwrap();

        let puts = client.puts().await;
        assert_eq!(puts.len(), 1);
        let keys: Vec<_> = puts[0]
            .1
            .iter()
            .map(|record| record.partition_key.as_str())
            .collect();
        assert_eq!(keys, vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_global_aggregation_collapses_partition_keys() {
        let client = MemoryStreamClient::new();
        let transform = SendStream::new(
            "stream",
            &stream_config(AggregationKeyPolicy::Global, true),
            Arc::new(client.clone()),
        )
        .unwrap();

        for pk in ["a", "b", "c"] {
            transform
                .transform(json_message(json!({"pk": pk})))
                .await
                .unwrap();
        }
        transform.transform(Message::control()).await.unwrap();

        let records = client.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].partition_key, "a");
        assert_eq!(
            RecordAggregate::decode(records[0].data.clone()).unwrap().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_per_partition_key_aggregation() {
        let client = MemoryStreamClient::new();
        let transform = SendStream::new(
            "stream",
            &stream_config(AggregationKeyPolicy::PartitionKey, true),
            Arc::new(client.clone()),
        )
        .unwrap();

        for pk in ["a", "b", "a"] {
            transform
                .transform(json_message(json!({"pk": pk})))
                .await
                .unwrap();
        }
        transform.transform(Message::control()).await.unwrap();

        let records = client.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].partition_key, "a");
        assert_eq!(
            RecordAggregate::decode(records[0].data.clone()).unwrap(),
            vec![
                Bytes::from(json!({"pk": "a"}).to_string()),
                Bytes::from(json!({"pk": "a"}).to_string())
            ]
        );
        assert_eq!(records[1].partition_key, "b");
    }

    #[tokio::test]
    async fn test_missing_partition_key_gets_a_random_key() {
        let client = MemoryStreamClient::new();
        let transform = SendStream::new(
            "stream",
            &stream_config(AggregationKeyPolicy::Global, false),
            Arc::new(client.clone()),
        )
        .unwrap();

        transform.transform(Message::from_data("x")).await.unwrap();
        transform.transform(Message::from_data("y")).await.unwrap();
        transform.transform(Message::control()).await.unwrap();

        let records = client.records().await;
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].partition_key, records[1].partition_key);
        assert!(Uuid::parse_str(&records[0].partition_key).is_ok());
    }

    #[tokio::test]
    async fn test_long_partition_keys_are_truncated() {
        let client = MemoryStreamClient::new();
        let transform = SendStream::new(
            "stream",
            &stream_config(AggregationKeyPolicy::Global, false),
            Arc::new(client.clone()),
        )
        .unwrap();

        let long_key = "k".repeat(300);
        transform
            .transform(json_message(json!({"pk": long_key})))
            .await
            .unwrap();
        transform.transform(Message::control()).await.unwrap();

        let records = client.records().await;
        assert_eq!(records[0].partition_key.len(), MAX_PARTITION_KEY_LENGTH);
    }

    #[tokio::test]
    async fn test_raw_batches_are_capped_at_the_put_limit() {
        let client = MemoryStreamClient::new();
        let transform = SendStream::new(
            "stream",
            &stream_config(AggregationKeyPolicy::Global, false),
            Arc::new(client.clone()),
        )
        .unwrap();

        for i in 0..(MAX_RECORDS_PER_PUT + 1) {
            transform
                .transform(Message::from_data(i.to_string()))
                .await
                .unwrap();
        }

        let puts = client.puts().await;
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].1.len(), MAX_RECORDS_PER_PUT);
    }

    #[test]
    fn test_small_size_limit_is_rejected() {
        let mut config = stream_config(AggregationKeyPolicy::Global, false);
        config.batch.size = 1_000;

        let result = SendStream::new("stream", &config, Arc::new(MemoryStreamClient::new()));
        assert_eq!(result.err().unwrap().kind(), ErrorKind::ValidationError);
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use crate::aggregate::{AddOutcome, BufferItem, MAX_PARTITION_KEY_LENGTH, RecordAggregate};
use crate::bail;
use crate::error::{ConduitResult, ErrorKind};
use crate::sink::Sink;

/// Maximum size of a single payload put into a data stream.
pub const MAX_RECORD_SIZE: usize = 1_000_000;

/// Maximum number of records in a single put.
pub const MAX_RECORDS_PER_PUT: usize = 500;

/// Maximum number of bytes, payloads and partition keys, in a single put.
pub const MAX_BYTES_PER_PUT: usize = 5_000_000;

/// A payload bound for a data stream together with its partition key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub partition_key: String,
    pub data: Bytes,
}

impl StreamRecord {
    pub fn new(partition_key: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            partition_key: partition_key.into(),
            data: data.into(),
        }
    }
}

impl BufferItem for StreamRecord {
    fn byte_size(&self) -> usize {
        self.partition_key.len() + self.data.len()
    }
}

/// A client putting records into a data stream.
///
/// Implementations own retries and timeouts of the underlying service calls.
#[async_trait]
pub trait StreamClient: Send + Sync {
    async fn put_records(&self, stream: &str, records: Vec<StreamRecord>) -> ConduitResult<()>;
}

/// A [`StreamClient`] recording every put in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStreamClient {
    puts: Arc<Mutex<Vec<(String, Vec<StreamRecord>)>>>,
}

impl MemoryStreamClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every put with its stream name, in arrival order.
    pub async fn puts(&self) -> Vec<(String, Vec<StreamRecord>)> {
        self.puts.lock().await.clone()
    }

    /// Returns every record put so far, in arrival order.
    pub async fn records(&self) -> Vec<StreamRecord> {
        let puts = self.puts.lock().await;
        puts.iter()
            .flat_map(|(_, records)| records.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl StreamClient for MemoryStreamClient {
    async fn put_records(&self, stream: &str, records: Vec<StreamRecord>) -> ConduitResult<()> {
        self.puts.lock().await.push((stream.to_owned(), records));

        Ok(())
    }
}

/// A sink putting batches of records into a data stream.
///
/// With record aggregation enabled, consecutive records of a batch are packed
/// into [`RecordAggregate`]s, each sent under the partition key of its first
/// record. Every batch is split into puts of at most [`MAX_RECORDS_PER_PUT`]
/// records and [`MAX_BYTES_PER_PUT`] bytes.
#[derive(Clone)]
pub struct StreamSink {
    stream: String,
    client: Arc<dyn StreamClient>,
    enable_record_aggregation: bool,
}

impl StreamSink {
    pub fn new(
        stream: impl Into<String>,
        client: Arc<dyn StreamClient>,
        enable_record_aggregation: bool,
    ) -> Self {
        Self {
            stream: stream.into(),
            client,
            enable_record_aggregation,
        }
    }

    fn aggregate(records: Vec<StreamRecord>) -> ConduitResult<Vec<StreamRecord>> {
        let mut aggregated = Vec::new();
        let mut aggregate = RecordAggregate::new();

        for record in records {
            if aggregate.add(record.data.clone(), &record.partition_key) == AddOutcome::Added {
                continue;
            }

            let (data, partition_key) = aggregate.get();
            aggregated.push(StreamRecord::new(partition_key, data));
            aggregate.reset();

            if aggregate.add(record.data, &record.partition_key).is_full() {
                bail!(
                    ErrorKind::BatchMisconfigured,
                    "Record does not fit an empty aggregate"
                );
            }
        }

        if !aggregate.is_empty() {
            let (data, partition_key) = aggregate.get();
            aggregated.push(StreamRecord::new(partition_key, data));
        }

        Ok(aggregated)
    }

    /// Splits records into consecutive puts honoring the per-put limits.
    fn split_into_puts(records: Vec<StreamRecord>) -> Vec<Vec<StreamRecord>> {
        let mut puts = Vec::new();
        let mut current = Vec::new();
        let mut current_size = 0;

        for record in records {
            let size = record.byte_size();
            if !current.is_empty()
                && (current.len() >= MAX_RECORDS_PER_PUT || current_size + size > MAX_BYTES_PER_PUT)
            {
                puts.push(std::mem::take(&mut current));
                current_size = 0;
            }

            current_size += size;
            current.push(record);
        }

        if !current.is_empty() {
            puts.push(current);
        }

        puts
    }
}

impl Sink<StreamRecord> for StreamSink {
    fn max_item_size(&self) -> usize {
        MAX_RECORD_SIZE + MAX_PARTITION_KEY_LENGTH
    }

    async fn send(&self, batch_key: &str, items: Vec<StreamRecord>) -> ConduitResult<()> {
        let records = if self.enable_record_aggregation {
            Self::aggregate(items)?
        } else {
            items
        };

        for put in Self::split_into_puts(records) {
            debug!(
                stream = %self.stream,
                batch_key,
                count = put.len(),
                "putting records into stream"
            );
            self.client.put_records(&self.stream, put).await?;
        }

        Ok(())
    }
}

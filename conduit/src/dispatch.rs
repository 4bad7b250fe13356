//! Keyed buffering in front of a [`Sink`].

use std::sync::Arc;
use std::time::Instant;

use conduit_config::shared::BatchConfig;
use metrics::{counter, histogram};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info};

use crate::aggregate::{AddOutcome, AggregationBuffer, BufferItem};
use crate::error::{ConduitResult, ErrorKind};
use crate::metrics::{
    CONDUIT_BATCH_SEND_DURATION_SECONDS, CONDUIT_BATCHES_FLUSHED_TOTAL,
    CONDUIT_BYTES_FLUSHED_TOTAL, CONDUIT_MESSAGES_BUFFERED_TOTAL, REASON_LABEL, TRANSFORM_LABEL,
};
use crate::sink::Sink;
use crate::{bail, conduit_error};

/// The threshold that triggered a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushReason {
    /// The count or size limit rejected an add.
    Full,
    /// The oldest buffered item exceeded the age limit.
    Expired,
    /// A control message was received.
    Control,
}

impl FlushReason {
    fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Full => "full",
            FlushReason::Expired => "expired",
            FlushReason::Control => "control",
        }
    }
}

type BufferGuard<T> = OwnedMutexGuard<AggregationBuffer<T>>;

/// Buffers items per key and flushes them to a sink.
///
/// A single lock guards the buffer for the whole add, flush, reset and re-add
/// sequence, including the send itself, so concurrent callers can neither
/// interleave inside a flush nor send the same batch twice.
///
/// Every flush runs on its own task that owns the lock until the batch is sent
/// and reset. A caller dropping its future, for example on a timeout, cannot
/// abandon a send halfway: the flush completes or fails on its own and the
/// next caller sees the outcome.
///
/// A failed send leaves the key's items buffered so a later flush can deliver
/// them again.
pub struct KeyedDispatcher<T, S> {
    id: String,
    sink: Arc<S>,
    buffer: Arc<Mutex<AggregationBuffer<T>>>,
}

impl<T, S> KeyedDispatcher<T, S>
where
    T: BufferItem + Clone + Send + Sync + 'static,
    S: Sink<T> + 'static,
{
    /// Creates a dispatcher for the transform `id`.
    ///
    /// Fails when a nonzero size limit cannot hold the largest item the sink accepts.
    pub fn new(id: impl Into<String>, config: &BatchConfig, sink: S) -> ConduitResult<Self> {
        config.validate_payload_limit(sink.max_item_size())?;

        Ok(Self {
            id: id.into(),
            sink: Arc::new(sink),
            buffer: Arc::new(Mutex::new(AggregationBuffer::new(config))),
        })
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Buffers `item` under `key`, flushing the key first when it is expired or full.
    ///
    /// Fails with [`ErrorKind::BatchMisconfigured`] when the item does not fit an
    /// empty buffer.
    pub async fn add(&self, key: &str, item: T) -> ConduitResult<()> {
        let mut buffer = self.buffer.clone().lock_owned().await;

        if buffer.is_expired(key) {
            buffer = self.flush_key(buffer, key, FlushReason::Expired).await?;
        }

        let retry = item.clone();
        if buffer.add(key, item) == AddOutcome::Full {
            buffer = self.flush_key(buffer, key, FlushReason::Full).await?;

            if buffer.add(key, retry).is_full() {
                error!(
                    transform = %self.id,
                    batch_key = key,
                    "item does not fit an empty buffer"
                );
                bail!(
                    ErrorKind::BatchMisconfigured,
                    "Item does not fit an empty buffer",
                    format!("transform {}", self.id)
                );
            }
        }

        counter!(CONDUIT_MESSAGES_BUFFERED_TOTAL, TRANSFORM_LABEL => self.id.clone()).increment(1);
        debug!(
            transform = %self.id,
            batch_key = key,
            count = buffer.count(key),
            bytes = buffer.size(key),
            "buffered item"
        );

        Ok(())
    }

    /// Flushes every key holding items, in key order.
    ///
    /// Stops at the first failed send. Keys flushed before it stay delivered and
    /// reset, the failed key and the keys after it stay buffered.
    pub async fn flush_all(&self) -> ConduitResult<()> {
        let mut buffer = self.buffer.clone().lock_owned().await;

        for key in buffer.keys() {
            buffer = self.flush_key(buffer, &key, FlushReason::Control).await?;
        }

        Ok(())
    }

    /// Returns the number of items buffered under `key`.
    pub async fn count(&self, key: &str) -> usize {
        self.buffer.lock().await.count(key)
    }

    /// Sends and resets `key` on a separate task, handing the lock back on success.
    async fn flush_key(
        &self,
        buffer: BufferGuard<T>,
        key: &str,
        reason: FlushReason,
    ) -> ConduitResult<BufferGuard<T>> {
        if buffer.count(key) == 0 {
            return Ok(buffer);
        }

        let id = self.id.clone();
        let sink = self.sink.clone();
        let key = key.to_owned();
        let flush = tokio::spawn(async move {
            let mut buffer = buffer;
            let result = send_batch(&id, sink.as_ref(), &mut buffer, &key, reason).await;

            (buffer, result)
        });

        let (buffer, result) = flush.await.map_err(|err| {
            conduit_error!(ErrorKind::Unknown, "Flush task did not complete", err)
        })?;
        result?;

        Ok(buffer)
    }
}

/// Sends the items of `key` and resets the key once the sink accepted them.
async fn send_batch<T, S>(
    id: &str,
    sink: &S,
    buffer: &mut AggregationBuffer<T>,
    key: &str,
    reason: FlushReason,
) -> ConduitResult<()>
where
    T: BufferItem + Clone + Send + Sync,
    S: Sink<T>,
{
    let items = buffer.get(key).to_vec();
    let count = items.len();
    let bytes = buffer.size(key);
    let started = Instant::now();

    if let Err(err) = sink.send(key, items).await {
        error!(
            transform = %id,
            batch_key = key,
            count,
            error = %err,
            "failed to send batch, keeping it buffered"
        );
        return Err(err);
    }

    buffer.reset(key);

    histogram!(CONDUIT_BATCH_SEND_DURATION_SECONDS, TRANSFORM_LABEL => id.to_owned())
        .record(started.elapsed().as_secs_f64());
    counter!(
        CONDUIT_BATCHES_FLUSHED_TOTAL,
        TRANSFORM_LABEL => id.to_owned(),
        REASON_LABEL => reason.as_str()
    )
    .increment(1);
    counter!(CONDUIT_BYTES_FLUSHED_TOTAL, TRANSFORM_LABEL => id.to_owned())
        .increment(bytes as u64);

    info!(
        transform = %id,
        batch_key = key,
        count,
        bytes,
        reason = reason.as_str(),
        "flushed batch"
    );

    Ok(())
}

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};

static REGISTER_METRICS: Once = Once::new();

pub const CONDUIT_MESSAGES_BUFFERED_TOTAL: &str = "conduit_messages_buffered_total";
pub const CONDUIT_BATCHES_FLUSHED_TOTAL: &str = "conduit_batches_flushed_total";
pub const CONDUIT_BYTES_FLUSHED_TOTAL: &str = "conduit_bytes_flushed_total";
pub const CONDUIT_BATCH_SEND_DURATION_SECONDS: &str = "conduit_batch_send_duration_seconds";
pub const CONDUIT_KV_STORE_OPERATIONS_TOTAL: &str = "conduit_kv_store_operations_total";
pub const TRANSFORM_LABEL: &str = "transform";
pub const REASON_LABEL: &str = "reason";
pub const OPERATION_LABEL: &str = "operation";

/// Registers the metrics emitted by conduit.
///
/// It is safe to call this method multiple times, the metrics are described only once.
pub fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            CONDUIT_MESSAGES_BUFFERED_TOTAL,
            Unit::Count,
            "Total number of payloads added to a sink buffer"
        );

        describe_counter!(
            CONDUIT_BATCHES_FLUSHED_TOTAL,
            Unit::Count,
            "Total number of batches delivered to a sink, labeled by the threshold that triggered the flush"
        );

        describe_counter!(
            CONDUIT_BYTES_FLUSHED_TOTAL,
            Unit::Bytes,
            "Total number of payload bytes delivered to a sink"
        );

        describe_histogram!(
            CONDUIT_BATCH_SEND_DURATION_SECONDS,
            Unit::Seconds,
            "Time taken in seconds to send a batch to a sink"
        );

        describe_counter!(
            CONDUIT_KV_STORE_OPERATIONS_TOTAL,
            Unit::Count,
            "Total number of key/value store operations performed by transforms"
        );
    });
}

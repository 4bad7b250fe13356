use std::future::Future;

use bytes::Bytes;

use crate::error::ConduitResult;

/// A downstream consumer of batched items.
///
/// A sink receives every batch together with the key it was buffered under.
/// Implementations perform no retries: a failed send is reported to the caller,
/// which keeps the batch buffered.
pub trait Sink<T = Bytes>: Send + Sync {
    /// Largest single item in bytes the sink accepts, or zero when unlimited.
    fn max_item_size(&self) -> usize {
        0
    }

    fn send(&self, batch_key: &str, items: Vec<T>) -> impl Future<Output = ConduitResult<()>> + Send;
}

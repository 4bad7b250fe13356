//! Bounded buffers that group payloads before they are sent.
//!
//! [`AggregationBuffer`] batches items per key by count, byte size and age.
//! [`RecordAggregate`] packs several payloads into one size-bounded binary record
//! for streaming sinks.

mod buffer;
mod record;

pub use buffer::*;
pub use record::*;

/// Result of offering an item to a bounded buffer.
///
/// [`AddOutcome::Full`] is an expected outcome, not an error: the caller flushes
/// the buffer, resets it and offers the item again.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The item was appended.
    Added,
    /// Appending the item would exceed a limit. Nothing was changed.
    Full,
}

impl AddOutcome {
    pub fn is_full(&self) -> bool {
        matches!(self, AddOutcome::Full)
    }
}

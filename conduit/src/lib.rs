//! Buffering, aggregation and control flow for message transform pipelines.
//!
//! Messages flow through a chain of [`transform::Transform`]s. Sink-facing
//! transforms buffer payloads per key in an [`aggregate::AggregationBuffer`]
//! and flush them through a [`sink::Sink`] when a threshold is crossed or a
//! control message arrives. Enrichment transforms read and write
//! [`kv::KvStore`]s with optional per-item expiration.

pub mod aggregate;
pub mod dispatch;
pub mod error;
pub mod kv;
mod macros;
pub mod message;
pub mod metrics;
pub mod pipeline;
pub mod sink;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transform;

//! Downstream sinks receiving batches of payloads.
//!
//! Provides the [`Sink`] trait, local sinks for standard output, files and
//! memory, and the data stream sink that packs records for streaming services.

mod base;
pub mod file;
pub mod memory;
pub mod stdout;
pub mod stream;

pub use base::Sink;

//! Configuration management for conduit pipelines.
//!
//! Provides environment detection, hierarchical configuration loading from YAML
//! files and environment variables, and the shared configuration types consumed
//! by transforms, sinks and key/value stores.

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;

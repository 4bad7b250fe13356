//! Key/value stores with optional per-item expiration.
//!
//! Stores are created through [`new_kv_store`] or shared through a
//! [`KvStoreRegistry`], set up lazily by the transforms using them and closed on
//! control messages when configured to.

mod base;
pub mod json_file;
pub mod memory;
mod registry;
pub mod text_file;
mod ttl;

pub use base::{KvStore, new_kv_store};
pub use registry::KvStoreRegistry;
pub use ttl::{TtlPolicy, truncate_ttl};

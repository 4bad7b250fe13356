//! Transforms and the rules every transform follows.
//!
//! A transform receives one message at a time and returns the messages that
//! continue down the chain. Control messages are always returned, exactly
//! once and unmodified, after the transform has flushed its buffers or
//! released its resources.

mod base;
pub mod control;
pub mod kv_store;
pub mod send;
pub mod send_stream;

pub use base::{Transform, TransformContext, apply, build_transform};

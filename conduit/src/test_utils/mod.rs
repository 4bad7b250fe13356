//! Test helpers shared by unit and integration tests.
//!
//! Provides a sink wrapper that records sends and injects failures, plus
//! shortcuts for building messages.

pub mod message;
pub mod sink;

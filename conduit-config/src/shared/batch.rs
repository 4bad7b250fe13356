use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Flush thresholds of a buffering sink.
///
/// A value of zero disables the corresponding threshold. When `count`, `size`
/// and `duration_ms` are all zero, buffered data is only released by a control
/// message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of items buffered under a single key.
    pub count: usize,
    /// Maximum number of bytes buffered under a single key.
    pub size: usize,
    /// Maximum time, in milliseconds, a key may buffer data before it is flushed.
    pub duration_ms: u64,
}

impl BatchConfig {
    /// Returns a config with every threshold disabled.
    pub fn unbounded() -> Self {
        Self {
            count: 0,
            size: 0,
            duration_ms: 0,
        }
    }

    /// Returns the age threshold, if enabled.
    pub fn max_age(&self) -> Option<Duration> {
        (self.duration_ms > 0).then(|| Duration::from_millis(self.duration_ms))
    }

    /// Caps the thresholds at the limits imposed by a sink.
    ///
    /// A disabled or larger threshold is replaced by the sink limit.
    pub fn clamp(&self, max_count: usize, max_size: usize) -> Self {
        let cap = |value: usize, limit: usize| {
            if value == 0 || value > limit {
                limit
            } else {
                value
            }
        };

        Self {
            count: cap(self.count, max_count),
            size: cap(self.size, max_size),
            duration_ms: self.duration_ms,
        }
    }

    /// Ensures a single payload of `payload_limit` bytes always fits in an empty batch.
    pub fn validate_payload_limit(&self, payload_limit: usize) -> Result<(), ValidationError> {
        if self.size > 0 && self.size < payload_limit {
            return Err(ValidationError::BatchSizeBelowPayloadLimit {
                size: self.size,
                limit: payload_limit,
            });
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            count: 1000,
            size: 1024 * 1024,
            duration_ms: 60_000,
        }
    }
}

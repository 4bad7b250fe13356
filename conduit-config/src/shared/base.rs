use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A pipeline must apply at least one transform.
    #[error("`transforms` cannot be empty")]
    NoTransforms,
    /// A transform is missing an option it cannot run without.
    #[error("`{option}` is required by the `{transform}` transform")]
    MissingOption {
        transform: &'static str,
        option: &'static str,
    },
    /// A nonzero byte ceiling can never fit a single payload accepted by the sink.
    #[error(
        "Invalid batch config: `size` ({size}) must be zero or at least the sink payload limit ({limit})"
    )]
    BatchSizeBelowPayloadLimit { size: usize, limit: usize },
    /// The interval of a control transform cannot be zero.
    #[error("`count` of the `utility_control` transform cannot be zero")]
    ControlIntervalZero,
    /// An in-memory key/value store must hold at least one entry.
    #[error("`capacity` of a memory kv store cannot be zero")]
    KvStoreCapacityZero,
}

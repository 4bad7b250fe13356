//! Macros for conduit error handling.

/// Creates a [`crate::error::ConduitError`] from an error kind, a static
/// description and an optional dynamic detail.
#[macro_export]
macro_rules! conduit_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::ConduitError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::ConduitError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::ConduitError`] from the current function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::conduit_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::conduit_error!($kind, $desc, $detail))
    };
}

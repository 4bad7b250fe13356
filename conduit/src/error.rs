use std::error;
use std::fmt;

use conduit_config::shared::ValidationError;

/// Convenient result type for conduit operations using [`ConduitError`] as the error type.
pub type ConduitResult<T> = Result<T, ConduitError>;

/// Main error type for conduit operations.
///
/// [`ConduitError`] can represent a single error, an error with additional
/// dynamic detail, or multiple aggregated errors. Every error carries an
/// [`ErrorKind`] so callers can branch on the failure mode without parsing
/// messages.
#[derive(Debug, Clone)]
pub struct ConduitError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    Many(Vec<ConduitError>),
}

/// Categories of errors that can occur while processing messages.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration Errors
    ConfigError,
    ValidationError,
    /// A payload does not fit an empty buffer, so flushing can never make room for it.
    BatchMisconfigured,

    // Sink Errors
    /// A single payload exceeds the per-record limit of a sink.
    RecordTooLarge,
    DestinationError,
    DestinationIoError,

    // Key/Value Store Errors
    KvStoreError,
    KvStoreOperationNotSupported,
    KvStoreNotEnabled,

    // Data & Transformation Errors
    InvalidData,
    ConversionError,

    // IO & Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // Unknown / Uncategorized
    Unknown,
}

impl ConduitError {
    /// Creates a [`ConduitError`] containing multiple aggregated errors.
    pub fn many(errors: Vec<ConduitError>) -> ConduitError {
        ConduitError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }
}

impl PartialEq for ConduitError {
    fn eq(&self, other: &ConduitError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => errors_a == errors_b,
            _ => false,
        }
    }
}

impl fmt::Display for ConduitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => write!(f, "{kind:?}: {desc}"),
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                write!(f, "{kind:?}: {desc} -> {detail}")
            }
            ErrorRepr::Many(ref errors) => match errors.as_slice() {
                [] => write!(f, "Multiple errors occurred (empty)"),
                [error] => error.fmt(f),
                errors => {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }

                    Ok(())
                }
            },
        }
    }
}

impl error::Error for ConduitError {}

/// Creates a [`ConduitError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for ConduitError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> ConduitError {
        ConduitError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

/// Creates a [`ConduitError`] from an error kind, static description, and dynamic detail.
impl From<(ErrorKind, &'static str, String)> for ConduitError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> ConduitError {
        ConduitError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl<E> From<Vec<E>> for ConduitError
where
    E: Into<ConduitError>,
{
    fn from(errors: Vec<E>) -> ConduitError {
        ConduitError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

impl From<std::io::Error> for ConduitError {
    fn from(err: std::io::Error) -> ConduitError {
        ConduitError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "I/O error occurred",
                err.to_string(),
            ),
        }
    }
}

/// Maps syntax and data failures to [`ErrorKind::DeserializationError`] and I/O
/// failures to [`ErrorKind::IoError`].
impl From<serde_json::Error> for ConduitError {
    fn from(err: serde_json::Error) -> ConduitError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        ConduitError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

impl From<std::str::Utf8Error> for ConduitError {
    fn from(err: std::str::Utf8Error) -> ConduitError {
        ConduitError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConversionError,
                "UTF-8 conversion failed",
                err.to_string(),
            ),
        }
    }
}

impl From<std::string::FromUtf8Error> for ConduitError {
    fn from(err: std::string::FromUtf8Error) -> ConduitError {
        ConduitError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConversionError,
                "UTF-8 string conversion failed",
                err.to_string(),
            ),
        }
    }
}

impl From<std::num::ParseIntError> for ConduitError {
    fn from(err: std::num::ParseIntError) -> ConduitError {
        ConduitError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConversionError,
                "Integer parsing failed",
                err.to_string(),
            ),
        }
    }
}

impl From<ValidationError> for ConduitError {
    fn from(err: ValidationError) -> ConduitError {
        ConduitError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ValidationError,
                "Invalid configuration",
                err.to_string(),
            ),
        }
    }
}

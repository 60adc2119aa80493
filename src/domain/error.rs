//! Errors raised by the logging API.
//!
//! Every variant is a programming error surfaced at the call that supplied the
//! bad value, except [`LogError::Backend`], which reports a failure of the
//! external backend while writing an emitted record.

use thiserror::Error;

/// Boxed error returned by a [`LoggerBackend`](crate::application::ports::LoggerBackend).
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the fluent logging API and the metadata layer.
#[derive(Debug, Error)]
pub enum LogError {
    /// A malformed argument, such as an invalid key label or `every(0)`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A metadata value does not have the type declared by its key.
    #[error("metadata key '{label}' expects values of type {expected}, got {actual}")]
    ClassCast {
        /// Label of the key the value was read through
        label: String,
        /// Type declared by the key
        expected: &'static str,
        /// Type of the stored value
        actual: &'static str,
    },

    /// A mutating call on a read-only view.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// A required argument was not supplied.
    #[error("required argument missing: {0}")]
    NullReference(&'static str),

    /// Housekeeping of a scoped logging context failed.
    #[error("invalid logging context state: {0}")]
    InvalidContextState(String),

    /// The backend failed to write an emitted record.
    #[error("backend failed to write log record: {0}")]
    Backend(#[source] BackendError),
}

impl LogError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        LogError::InvalidArgument(message.into())
    }

    /// Check if this is an [`LogError::InvalidArgument`].
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, LogError::InvalidArgument(_))
    }
}

/// Error returned when building a logger or state store fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// No backend was configured
    #[error("a logger backend must be configured")]
    MissingBackend,
    /// The logger name was empty
    #[error("logger name must not be empty")]
    EmptyName,
}

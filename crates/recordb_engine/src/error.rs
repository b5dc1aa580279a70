//! Error types for engine operations.

use recordb_codec::CodecError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by a storage engine request.
///
/// The variants follow the failure classes a versioned key-value engine
/// reports on its request error events. The type is `Clone` because a failed
/// transaction keeps its error around for its completion to report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A write would break a uniqueness rule (duplicate primary key or
    /// unique index value).
    #[error("constraint violated: {message}")]
    Constraint {
        /// Description of the violated constraint.
        message: String,
    },

    /// A key, key range or record was not usable for the request.
    #[error("invalid data: {message}")]
    Data {
        /// Description of the problem.
        message: String,
    },

    /// A named store, index or database does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// The request is not allowed in the current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Why the request is not allowed.
        message: String,
    },

    /// The transaction has already committed, aborted or failed.
    #[error("transaction is no longer active")]
    TransactionInactive,

    /// A write request was issued in a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The requested version is lower than the stored one.
    #[error("requested version {requested} is lower than stored version {stored}")]
    Version {
        /// Version requested by the caller.
        requested: u64,
        /// Version currently stored.
        stored: u64,
    },

    /// Another transaction committed changes to the same store first.
    #[error("transaction conflict on store {store}")]
    Conflict {
        /// Store that changed underneath the transaction.
        store: String,
    },

    /// The transaction was aborted.
    #[error("transaction aborted")]
    Aborted,

    /// A stored record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl EngineError {
    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether this error fails the transaction it was raised in.
    ///
    /// Only errors raised while a write executes do. Argument and scope
    /// errors are reported to the caller and leave the transaction usable.
    #[must_use]
    pub fn fails_transaction(&self) -> bool {
        matches!(self, Self::Constraint { .. } | Self::Codec(_))
    }
}

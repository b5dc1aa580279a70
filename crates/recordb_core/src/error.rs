//! Error types for recordb core.

use recordb_codec::CodecError;
use recordb_engine::EngineError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in recordb core operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A transaction named an entity that was never registered.
    #[error("entity {name} is not registered with this database")]
    NotRegistered {
        /// Entity name.
        name: String,
    },

    /// An entity outside the transaction's scope was requested.
    #[error("entity {name} is not allowed for this transaction")]
    NotInScope {
        /// Entity name.
        name: String,
    },

    /// An index name is not declared on the entity.
    #[error("no index {index} on entity {entity}")]
    IndexNotFound {
        /// Entity name.
        entity: String,
        /// Requested index name.
        index: String,
    },

    /// An upgrade found an existing store with no migration registered.
    #[error("store {store} already exists and has no registered migration")]
    MissingMigration {
        /// Store name.
        store: String,
    },

    /// The transaction was aborted.
    #[error("transaction aborted")]
    Aborted,

    /// The storage engine reported an error.
    #[error("engine error: {0}")]
    Engine(EngineError),

    /// A record could not be converted.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a not registered error.
    pub fn not_registered(name: impl Into<String>) -> Self {
        Self::NotRegistered { name: name.into() }
    }

    /// Creates a scope error.
    pub fn not_in_scope(name: impl Into<String>) -> Self {
        Self::NotInScope { name: name.into() }
    }

    /// Creates an index not found error.
    pub fn index_not_found(entity: impl Into<String>, index: impl Into<String>) -> Self {
        Self::IndexNotFound {
            entity: entity.into(),
            index: index.into(),
        }
    }

    /// Creates a missing migration error.
    pub fn missing_migration(store: impl Into<String>) -> Self {
        Self::MissingMigration {
            store: store.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Whether this error reports an aborted transaction rather than a
    /// failure.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl From<EngineError> for CoreError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Aborted => Self::Aborted,
            EngineError::Codec(codec) => Self::Codec(codec),
            other => Self::Engine(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_abort_becomes_abort() {
        let error = CoreError::from(EngineError::Aborted);
        assert!(error.is_abort());
        assert!(!CoreError::from(EngineError::ReadOnly).is_abort());
    }

    #[test]
    fn engine_codec_errors_are_unwrapped() {
        let error = CoreError::from(EngineError::Codec(CodecError::IntegerOverflow));
        assert_eq!(error, CoreError::Codec(CodecError::IntegerOverflow));
    }

    #[test]
    fn messages_name_the_subject() {
        assert_eq!(
            CoreError::not_in_scope("Person").to_string(),
            "entity Person is not allowed for this transaction"
        );
        assert_eq!(
            CoreError::index_not_found("Person", "age").to_string(),
            "no index age on entity Person"
        );
    }
}

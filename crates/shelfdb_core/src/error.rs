//! Error types for ShelfDB core.

use shelfdb_storage::StorageError;
use std::sync::Arc;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ShelfDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error outside the batched write path.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Document codec error.
    #[error("codec error: {0}")]
    Codec(#[from] shelfdb_codec::CodecError),

    /// A record could not be converted to or from its entity type.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The entity type has no registration.
    #[error("entity type not registered: {type_name}")]
    NotRegistered {
        /// Rust type name of the entity.
        type_name: &'static str,
    },

    /// A registration was attempted without a storage identifier.
    #[error("missing storage identifier for {type_name}")]
    MissingStorageId {
        /// Rust type name of the entity.
        type_name: &'static str,
    },

    /// The storage identifier already belongs to another entity type.
    #[error("storage identifier {storage_id} is already registered to {existing}")]
    DuplicateStorageId {
        /// The contested storage identifier.
        storage_id: String,
        /// Type name of the current owner.
        existing: &'static str,
    },

    /// A batch could not be made durable.
    ///
    /// Every write that shared the batch receives this error.
    #[error("durable write failed after {attempts} attempts: {source}")]
    PersistenceFailed {
        /// Number of write attempts made.
        attempts: u32,
        /// The last storage error.
        #[source]
        source: Arc<StorageError>,
    },

    /// No record with the identifier exists in the collection.
    #[error("entity {id} not found in {storage_id}/{collection_key}")]
    EntityNotFound {
        /// Storage identifier searched.
        storage_id: String,
        /// Collection key searched.
        collection_key: String,
        /// The missing identifier.
        id: String,
    },

    /// The store document does not exist and creation is disabled.
    #[error("store not found: {path}")]
    StoreNotFound {
        /// Path of the missing document.
        path: String,
    },

    /// An argument was out of range.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// The repository has been closed.
    #[error("repository is closed")]
    RepositoryClosed,
}

impl CoreError {
    /// Creates a not-registered error for `T`.
    pub fn not_registered<T: ?Sized>() -> Self {
        Self::NotRegistered {
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns true for registry misconfiguration.
    ///
    /// These are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotRegistered { .. }
                | Self::MissingStorageId { .. }
                | Self::DuplicateStorageId { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unregistered;

    #[test]
    fn not_registered_names_the_type() {
        let err = CoreError::not_registered::<Unregistered>();
        assert!(err.to_string().contains("Unregistered"));
        assert!(err.is_configuration());
    }

    #[test]
    fn persistence_failure_exposes_source() {
        use std::error::Error as _;

        let err = CoreError::PersistenceFailed {
            attempts: 3,
            source: Arc::new(StorageError::InjectedFailure),
        };
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.source().is_some());
        assert!(!err.is_configuration());
    }
}

//! # Storage Errors
//!
//! Error types for the backend row stores. These are invariant
//! backstops: the engine checks its own preconditions first, so a
//! storage error surfacing from a well-formed call indicates a logic
//! fault, not a transient condition. Nothing here is retried.

use thiserror::Error;

use crate::model::{AuditId, EntityId};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Backend row-store errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// No row for (model, id)
    #[error("no {model} row with id {id}")]
    EntityNotFound { model: String, id: EntityId },

    /// A row for (model, id) already exists
    #[error("{model} row with id {id} already exists")]
    DuplicateEntity { model: String, id: EntityId },

    /// No audit row with this id
    #[error("no audit row with id {0}")]
    AuditNotFound(AuditId),

    /// An audit row with this id already exists
    #[error("audit row with id {0} already exists")]
    DuplicateAudit(AuditId),

    /// The audit's resolution pointer is already set; it is set exactly
    /// once, ever
    #[error("audit {0} already carries a resolution pointer")]
    RefAlreadySet(AuditId),
}

impl StorageError {
    /// Stable error code for the embedding layer
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::EntityNotFound { .. } => "ENTITY_NOT_FOUND",
            StorageError::DuplicateEntity { .. } => "DUPLICATE_ENTITY",
            StorageError::AuditNotFound(_) => "AUDIT_NOT_FOUND",
            StorageError::DuplicateAudit(_) => "DUPLICATE_AUDIT",
            StorageError::RefAlreadySet(_) => "REF_ALREADY_SET",
        }
    }
}

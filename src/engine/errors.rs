//! # Engine Errors
//!
//! The failure taxonomy of the audit engine. Every error propagates to
//! the immediate caller uncaught and nothing is retried internally: an
//! authorization failure or a stale resolution is a logic condition,
//! not a transient fault. Failures never leave partial state behind;
//! the surrounding transaction rolls back whole.

use thiserror::Error;

use crate::model::{AuditId, EntityId, ModelError, UserId};
use crate::permission::PermissionError;
use crate::storage::StorageError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Audit engine errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The acting user lacks the permission an operation requires.
    /// Never downgraded; the target names the offending field or model.
    #[error("user {user} may not {action} {target}")]
    Authorization {
        user: UserId,
        action: &'static str,
        target: String,
    },

    /// The audit's resolution pointer is already set; resolving twice
    /// is always an error
    #[error("audit {audit} is already resolved")]
    AlreadyResolved { audit: AuditId },

    /// The audit is not a pending edit, so it cannot go through
    /// moderation resolution
    #[error("audit {audit} is not a pending edit")]
    NotPending { audit: AuditId },

    /// The audit is an unapplied pending edit, so it cannot go through
    /// retroactive review
    #[error("audit {audit} is an unapplied pending edit; resolve it through moderation")]
    PendingEdit { audit: AuditId },

    /// A structural invariant would be violated; always fatal to the
    /// operation and always rolled back, never auto-healed
    #[error("integrity violation on '{model}': {detail}")]
    IntegrityViolation { model: String, detail: String },

    /// A save references a related entity that does not exist; checked
    /// proactively before any write is attempted
    #[error("'{model}.{field}' references {target_model} {target}, which does not exist")]
    ForeignKeyMissing {
        model: String,
        field: String,
        target_model: String,
        target: EntityId,
    },

    /// Underlying model failure
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Underlying permission failure
    #[error(transparent)]
    Permission(#[from] PermissionError),

    /// Underlying storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Stable error code for the embedding layer
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Authorization { .. } => "AUTHORIZATION_DENIED",
            EngineError::AlreadyResolved { .. } => "ALREADY_RESOLVED",
            EngineError::NotPending { .. } => "NOT_PENDING",
            EngineError::PendingEdit { .. } => "PENDING_EDIT",
            EngineError::IntegrityViolation { .. } => "INTEGRITY_VIOLATION",
            EngineError::ForeignKeyMissing { .. } => "FOREIGN_KEY_MISSING",
            EngineError::Model(err) => err.code(),
            EngineError::Permission(err) => err.code(),
            EngineError::Storage(err) => err.code(),
        }
    }
}

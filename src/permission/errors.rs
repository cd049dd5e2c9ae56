//! # Permission Errors
//!
//! Error types for roles, grants, and permission resolution.

use thiserror::Error;

use crate::model::{ModelError, RoleId, ScopeId};

/// Result type for permission operations
pub type PermissionResult<T> = Result<T, PermissionError>;

/// Role and grant errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PermissionError {
    /// A grant names a model or field that is not registered, or targets
    /// the identity/bypass surface. Raised when the grant is saved, not
    /// when it is consulted.
    #[error("invalid permission target '{model}.{field}': {reason}")]
    InvalidTarget {
        model: String,
        field: String,
        reason: String,
    },

    /// Role id is not registered
    #[error("unknown role {0}")]
    UnknownRole(RoleId),

    /// A role with this name already exists in the scope
    #[error("role '{name}' already exists in scope {scope}")]
    DuplicateRole { name: String, scope: ScopeId },

    /// No `public` fallback role exists for the scope
    #[error("scope {0} has no public role to fall back to")]
    MissingPublicRole(ScopeId),

    /// Underlying model registry failure
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl PermissionError {
    /// Stable error code for the embedding layer
    pub fn code(&self) -> &'static str {
        match self {
            PermissionError::InvalidTarget { .. } => "INVALID_PERMISSION_TARGET",
            PermissionError::UnknownRole(_) => "UNKNOWN_ROLE",
            PermissionError::DuplicateRole { .. } => "DUPLICATE_ROLE",
            PermissionError::MissingPublicRole(_) => "MISSING_PUBLIC_ROLE",
            PermissionError::Model(err) => err.code(),
        }
    }
}

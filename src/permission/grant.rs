//! Field grants
//!
//! A `FieldGrant` is one (model, field, role, scope) → level row. Grants
//! are unique per key; the service validates the target against the
//! model registry when the grant is saved.

use serde::{Deserialize, Serialize};

use crate::model::{RoleId, ScopeId};

use super::level::PermissionLevel;

/// One field-level permission row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGrant {
    /// Target model name
    pub model: String,
    /// Target field name
    pub field: String,
    /// Role the grant applies to
    pub role: RoleId,
    /// Scope the grant applies in
    pub scope: ScopeId,
    /// Granted level
    pub level: PermissionLevel,
}

impl FieldGrant {
    /// Create a grant row
    pub fn new(
        model: impl Into<String>,
        field: impl Into<String>,
        role: RoleId,
        scope: ScopeId,
        level: PermissionLevel,
    ) -> Self {
        Self {
            model: model.into(),
            field: field.into(),
            role,
            scope,
            level,
        }
    }
}

//! Authorization gate
//!
//! Decides, per changed field, whether a save applies directly, queues
//! for moderation, or fails. Authorization is all-or-nothing at the
//! entity level: one rejected field fails the whole save, naming the
//! first offending field, and field-level routing only happens once the
//! save as a whole is authorized. Creation and deletion are single
//! model-level checks, never partial field-by-field decisions.

use crate::model::{Entity, ModelDef, RoleId, ScopeId, UserId};
use crate::permission::{CreateCapability, PermissionLevel, PermissionService, Role};

use super::errors::{EngineError, EngineResult};
use super::tracker::FieldChange;

/// A change routed by the gate
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedChange {
    /// The underlying field change
    pub change: FieldChange,
    /// Whether the change must queue as a pending edit
    pub pending: bool,
}

/// Route every changed field, or fail the save whole.
///
/// `WRITE_DIRECTLY` routes direct, `WRITE_WITH_AUDIT` routes pending,
/// anything lower rejects the entire save.
pub fn route_changes(
    permissions: &PermissionService,
    role: RoleId,
    scope: ScopeId,
    model: &ModelDef,
    changes: Vec<FieldChange>,
    user: UserId,
) -> EngineResult<Vec<RoutedChange>> {
    let mut routed = Vec::with_capacity(changes.len());
    for change in changes {
        let level = permissions.field_level(role, scope, model, &change.field)?;
        if !level.allows_writes() {
            return Err(EngineError::Authorization {
                user,
                action: "write",
                target: format!("{}.{}", model.name, change.field),
            });
        }
        routed.push(RoutedChange {
            pending: level != PermissionLevel::WriteDirectly,
            change,
        });
    }
    Ok(routed)
}

/// Model-level create check; `Forbidden` fails immediately.
pub fn check_create(role: &Role, model: &ModelDef, user: UserId) -> EngineResult<CreateCapability> {
    match role.can_create(&model.name) {
        CreateCapability::Forbidden => Err(EngineError::Authorization {
            user,
            action: "create",
            target: model.name.clone(),
        }),
        capability => Ok(capability),
    }
}

/// Model-level delete check.
///
/// A model may opt in to the creator override: the creating user may
/// always delete their own rows, regardless of role.
pub fn check_delete(
    role: &Role,
    model: &ModelDef,
    entity: &Entity,
    user: UserId,
) -> EngineResult<()> {
    if role.can_delete(&model.name) {
        return Ok(());
    }
    if model.creator_override && entity.created_by() == Some(user) {
        return Ok(());
    }
    Err(EngineError::Authorization {
        user,
        action: "delete",
        target: model.name.clone(),
    })
}

//! Roles
//!
//! A role bundles the model-level capabilities (create/delete) a user
//! holds in a scope, plus the default field level used when seeding
//! grants for fields that have none yet. Three names are reserved by
//! convention and carry standard capability shapes: `administrator`,
//! `editor`, and `public`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::ScopeId;

use super::level::PermissionLevel;

/// Reserved role name: full direct access
pub const ROLE_ADMINISTRATOR: &str = "administrator";
/// Reserved role name: audited contributor
pub const ROLE_EDITOR: &str = "editor";
/// Reserved role name: read-only fallback for unassigned users
pub const ROLE_PUBLIC: &str = "public";

/// Model-level create capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateCapability {
    /// Creation is denied outright
    Forbidden,
    /// Creation is queued as a pending insert awaiting moderation
    Pending,
    /// Creation applies immediately when every field also writes directly
    Direct,
}

/// Named capability bundle within a scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Role name; reserved names carry conventional semantics
    pub name: String,
    /// Scope the role belongs to, or `None` for a global role
    pub scope: Option<ScopeId>,
    /// Field level used when seeding grants for uncovered fields
    pub default_level: PermissionLevel,
    create: BTreeMap<String, CreateCapability>,
    delete: BTreeMap<String, bool>,
}

impl Role {
    /// Create a role with no model capabilities
    pub fn new(
        name: impl Into<String>,
        scope: Option<ScopeId>,
        default_level: PermissionLevel,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            default_level,
            create: BTreeMap::new(),
            delete: BTreeMap::new(),
        }
    }

    /// Grant a create capability for a model
    pub fn grant_create(mut self, model: impl Into<String>, capability: CreateCapability) -> Self {
        self.create.insert(model.into(), capability);
        self
    }

    /// Grant delete capability for a model
    pub fn grant_delete(mut self, model: impl Into<String>) -> Self {
        self.delete.insert(model.into(), true);
        self
    }

    /// Create capability for a model; ungranted models are forbidden
    pub fn can_create(&self, model: &str) -> CreateCapability {
        self.create
            .get(model)
            .copied()
            .unwrap_or(CreateCapability::Forbidden)
    }

    /// Whether the role may delete rows of a model
    pub fn can_delete(&self, model: &str) -> bool {
        self.delete.get(model).copied().unwrap_or(false)
    }

    /// Whether the name is one of the reserved role names
    pub fn is_reserved_name(name: &str) -> bool {
        matches!(name, ROLE_ADMINISTRATOR | ROLE_EDITOR | ROLE_PUBLIC)
    }
}

/// The conventional role set for a scope, covering the given models:
/// administrator (direct everything), editor (audited writes, pending
/// creates), public (read-only).
pub fn standard_roles<'a, I>(scope: ScopeId, models: I) -> Vec<Role>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    let mut administrator = Role::new(
        ROLE_ADMINISTRATOR,
        Some(scope),
        PermissionLevel::WriteDirectly,
    );
    let mut editor = Role::new(ROLE_EDITOR, Some(scope), PermissionLevel::WriteWithAudit);
    let public = Role::new(ROLE_PUBLIC, Some(scope), PermissionLevel::ReadOnly);

    for model in models.clone() {
        administrator = administrator
            .grant_create(model, CreateCapability::Direct)
            .grant_delete(model);
        editor = editor.grant_create(model, CreateCapability::Pending);
    }

    vec![administrator, editor, public]
}

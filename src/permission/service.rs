//! Permission service
//!
//! Owns roles, role assignments, and field grants, and resolves the
//! effective permission set for a (role, scope, model) through the
//! process-wide cache. All mutation paths invalidate the cache
//! explicitly before returning; nothing here relies on expiry.
//!
//! Resolution rules:
//! - a field covered by a grant carries the granted level
//! - a field in the model's bypass set is always fully writable
//! - any other field is implicitly `None`

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::model::{ModelDef, ModelRegistry, RoleId, ScopeId, UserId, IDENTITY_FIELD};

use super::cache::{EffectivePermissions, PermissionCache};
use super::errors::{PermissionError, PermissionResult};
use super::grant::FieldGrant;
use super::level::PermissionLevel;
use super::role::{Role, ROLE_PUBLIC};

#[derive(Debug, Default)]
struct Inner {
    roles: BTreeMap<RoleId, Role>,
    next_role: u64,
    grants: BTreeMap<(RoleId, ScopeId, String), BTreeMap<String, PermissionLevel>>,
    assignments: BTreeMap<(UserId, ScopeId), RoleId>,
}

/// Role, assignment, and grant store with cached resolution
#[derive(Debug)]
pub struct PermissionService {
    registry: Arc<ModelRegistry>,
    inner: RwLock<Inner>,
    cache: PermissionCache,
}

impl PermissionService {
    /// Create a service over the given model registry
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            inner: RwLock::new(Inner::default()),
            cache: PermissionCache::new(),
        }
    }

    /// The model registry the service validates against
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    // ==================
    // Roles
    // ==================

    /// Register a role; (name, scope) pairs are unique
    pub fn register_role(&self, role: Role) -> PermissionResult<RoleId> {
        let mut inner = self.inner.write().unwrap();
        if let Some(scope) = role.scope {
            let duplicate = inner
                .roles
                .values()
                .any(|r| r.name == role.name && r.scope == Some(scope));
            if duplicate {
                return Err(PermissionError::DuplicateRole {
                    name: role.name,
                    scope,
                });
            }
        }
        inner.next_role += 1;
        let id = RoleId::new(inner.next_role);
        inner.roles.insert(id, role);
        Ok(id)
    }

    /// Replace a role definition; invalidates every cached entry for it
    pub fn update_role(&self, id: RoleId, role: Role) -> PermissionResult<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.roles.contains_key(&id) {
            return Err(PermissionError::UnknownRole(id));
        }
        inner.roles.insert(id, role);
        drop(inner);
        self.cache.invalidate_role(id);
        Ok(())
    }

    /// Fetch a role by id
    pub fn role(&self, id: RoleId) -> PermissionResult<Role> {
        self.inner
            .read()
            .unwrap()
            .roles
            .get(&id)
            .cloned()
            .ok_or(PermissionError::UnknownRole(id))
    }

    /// Assign a user to a role within a scope
    pub fn assign_role(&self, user: UserId, scope: ScopeId, role: RoleId) -> PermissionResult<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.roles.contains_key(&role) {
            return Err(PermissionError::UnknownRole(role));
        }
        inner.assignments.insert((user, scope), role);
        Ok(())
    }

    /// Role of a user in a scope; unassigned users fall back to the
    /// scope's `public` role.
    pub fn role_of(&self, user: UserId, scope: ScopeId) -> PermissionResult<RoleId> {
        let inner = self.inner.read().unwrap();
        if let Some(role) = inner.assignments.get(&(user, scope)) {
            return Ok(*role);
        }
        inner
            .roles
            .iter()
            .find(|(_, r)| r.name == ROLE_PUBLIC && r.scope == Some(scope))
            .map(|(id, _)| *id)
            .ok_or(PermissionError::MissingPublicRole(scope))
    }

    // ==================
    // Grants
    // ==================

    /// Insert or update a grant row.
    ///
    /// The target is validated against the registry here, at save time:
    /// the model must be registered and audit-capable, the field must be
    /// declared, and the identity/bypass surface is not grantable.
    pub fn upsert_grant(&self, grant: FieldGrant) -> PermissionResult<()> {
        let invalid = |reason: &str| PermissionError::InvalidTarget {
            model: grant.model.clone(),
            field: grant.field.clone(),
            reason: reason.to_string(),
        };

        let model = self
            .registry
            .get(&grant.model)
            .map_err(|_| invalid("model is not registered"))?;
        if grant.field == IDENTITY_FIELD || model.bypass.contains(&grant.field) {
            return Err(invalid("field is permission-exempt"));
        }
        if !model.fields.contains_key(&grant.field) {
            return Err(invalid("field is not declared on the model"));
        }

        {
            let mut inner = self.inner.write().unwrap();
            if !inner.roles.contains_key(&grant.role) {
                return Err(PermissionError::UnknownRole(grant.role));
            }
            inner
                .grants
                .entry((grant.role, grant.scope, grant.model.clone()))
                .or_default()
                .insert(grant.field.clone(), grant.level);
        }
        self.cache.invalidate_model(grant.scope, &grant.model);
        Ok(())
    }

    /// Seed grants at the role's default level for every declared field
    /// of a model that is not yet covered.
    pub fn seed_model(&self, role: RoleId, scope: ScopeId, model: &str) -> PermissionResult<()> {
        let def = self.registry.get(model)?;
        let default_level = self.role(role)?.default_level;
        {
            let mut inner = self.inner.write().unwrap();
            let entry = inner
                .grants
                .entry((role, scope, model.to_string()))
                .or_default();
            for field in def.fields.keys() {
                if def.bypass.contains(field) {
                    continue;
                }
                entry.entry(field.clone()).or_insert(default_level);
            }
        }
        self.cache.invalidate_model(scope, model);
        Ok(())
    }

    /// Cascade deletion of a field definition: drop its grants for every
    /// role and scope.
    pub fn drop_field_grants(&self, model: &str, field: &str) {
        {
            let mut inner = self.inner.write().unwrap();
            for ((_, _, m), fields) in inner.grants.iter_mut() {
                if m == model {
                    fields.remove(field);
                }
            }
        }
        // Grants for the field may be cached under any scope
        self.cache.clear();
    }

    // ==================
    // Resolution
    // ==================

    /// Effective permission set for (role, scope, model), cached
    pub fn effective(
        &self,
        role: RoleId,
        scope: ScopeId,
        model: &str,
    ) -> PermissionResult<Arc<EffectivePermissions>> {
        self.registry.get(model)?;
        if let Some(cached) = self.cache.get(role, scope, model) {
            return Ok(cached);
        }
        let inner = self.inner.read().unwrap();
        if !inner.roles.contains_key(&role) {
            return Err(PermissionError::UnknownRole(role));
        }
        let resolved: Arc<EffectivePermissions> = Arc::new(
            inner
                .grants
                .get(&(role, scope, model.to_string()))
                .cloned()
                .unwrap_or_default(),
        );
        drop(inner);
        self.cache.insert(role, scope, model, Arc::clone(&resolved));
        Ok(resolved)
    }

    /// Effective permission set for a user, through their role in the
    /// scope (or the public fallback)
    pub fn effective_for_user(
        &self,
        user: UserId,
        scope: ScopeId,
        model: &str,
    ) -> PermissionResult<Arc<EffectivePermissions>> {
        let role = self.role_of(user, scope)?;
        self.effective(role, scope, model)
    }

    /// Level a role holds on one field
    pub fn field_level(
        &self,
        role: RoleId,
        scope: ScopeId,
        model: &ModelDef,
        field: &str,
    ) -> PermissionResult<PermissionLevel> {
        if field == IDENTITY_FIELD || model.bypass.contains(field) {
            return Ok(PermissionLevel::WriteDirectly);
        }
        let effective = self.effective(role, scope, &model.name)?;
        Ok(effective
            .get(field)
            .copied()
            .unwrap_or(PermissionLevel::None))
    }

    /// Test hook: number of live cache entries
    #[cfg(test)]
    pub(crate) fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::role::standard_roles;

    fn service() -> (PermissionService, RoleId, ScopeId) {
        let registry = Arc::new(ModelRegistry::inventory());
        let service = PermissionService::new(registry);
        let scope = ScopeId::new(1);
        let roles = standard_roles(scope, ["plot", "tree"]);
        let mut editor = RoleId::new(0);
        for role in roles {
            let is_editor = role.name == "editor";
            let id = service.register_role(role).unwrap();
            if is_editor {
                editor = id;
            }
        }
        (service, editor, scope)
    }

    #[test]
    fn test_uncovered_field_is_none() {
        let (service, editor, scope) = service();
        let tree = service.registry().get("tree").unwrap().clone();
        let level = service.field_level(editor, scope, &tree, "diameter").unwrap();
        assert_eq!(level, PermissionLevel::None);
    }

    #[test]
    fn test_grant_then_resolve() {
        let (service, editor, scope) = service();
        service
            .upsert_grant(FieldGrant::new(
                "tree",
                "diameter",
                editor,
                scope,
                PermissionLevel::WriteWithAudit,
            ))
            .unwrap();
        let tree = service.registry().get("tree").unwrap().clone();
        let level = service.field_level(editor, scope, &tree, "diameter").unwrap();
        assert_eq!(level, PermissionLevel::WriteWithAudit);
    }

    #[test]
    fn test_identity_field_bypasses_grants() {
        let (service, editor, scope) = service();
        let tree = service.registry().get("tree").unwrap().clone();
        let level = service.field_level(editor, scope, &tree, "id").unwrap();
        assert_eq!(level, PermissionLevel::WriteDirectly);
    }

    #[test]
    fn test_invalid_grant_targets() {
        let (service, editor, scope) = service();
        // Unregistered model
        let err = service
            .upsert_grant(FieldGrant::new(
                "shrub",
                "height",
                editor,
                scope,
                PermissionLevel::ReadOnly,
            ))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PERMISSION_TARGET");
        // Undeclared field
        let err = service
            .upsert_grant(FieldGrant::new(
                "tree",
                "girth",
                editor,
                scope,
                PermissionLevel::ReadOnly,
            ))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PERMISSION_TARGET");
        // Identity surface
        let err = service
            .upsert_grant(FieldGrant::new(
                "tree",
                "id",
                editor,
                scope,
                PermissionLevel::ReadOnly,
            ))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PERMISSION_TARGET");
    }

    #[test]
    fn test_grant_mutation_invalidates_cache() {
        let (service, editor, scope) = service();
        service
            .upsert_grant(FieldGrant::new(
                "tree",
                "diameter",
                editor,
                scope,
                PermissionLevel::ReadOnly,
            ))
            .unwrap();
        let tree = service.registry().get("tree").unwrap().clone();
        assert_eq!(
            service.field_level(editor, scope, &tree, "diameter").unwrap(),
            PermissionLevel::ReadOnly
        );
        assert!(service.cached_entries() > 0);

        // Upgrading the grant must be visible immediately; there is no TTL
        service
            .upsert_grant(FieldGrant::new(
                "tree",
                "diameter",
                editor,
                scope,
                PermissionLevel::WriteDirectly,
            ))
            .unwrap();
        assert_eq!(
            service.field_level(editor, scope, &tree, "diameter").unwrap(),
            PermissionLevel::WriteDirectly
        );
    }

    #[test]
    fn test_role_fallback_to_public() {
        let (service, _, scope) = service();
        let role_id = service.role_of(UserId::new(99), scope).unwrap();
        let role = service.role(role_id).unwrap();
        assert_eq!(role.name, ROLE_PUBLIC);
    }

    #[test]
    fn test_missing_public_role() {
        let registry = Arc::new(ModelRegistry::inventory());
        let service = PermissionService::new(registry);
        let err = service.role_of(UserId::new(1), ScopeId::new(9)).unwrap_err();
        assert_eq!(err.code(), "MISSING_PUBLIC_ROLE");
    }

    #[test]
    fn test_seed_model_fills_uncovered_fields() {
        let (service, editor, scope) = service();
        service
            .upsert_grant(FieldGrant::new(
                "tree",
                "species",
                editor,
                scope,
                PermissionLevel::WriteDirectly,
            ))
            .unwrap();
        service.seed_model(editor, scope, "tree").unwrap();
        let effective = service.effective(editor, scope, "tree").unwrap();
        // Existing grant untouched, everything else at the role default
        assert_eq!(
            effective.get("species"),
            Some(&PermissionLevel::WriteDirectly)
        );
        assert_eq!(
            effective.get("diameter"),
            Some(&PermissionLevel::WriteWithAudit)
        );
        assert_eq!(
            effective.get("plot"),
            Some(&PermissionLevel::WriteWithAudit)
        );
    }

    #[test]
    fn test_drop_field_grants_cascades() {
        let (service, editor, scope) = service();
        service
            .upsert_grant(FieldGrant::new(
                "tree",
                "diameter",
                editor,
                scope,
                PermissionLevel::WriteWithAudit,
            ))
            .unwrap();
        service.drop_field_grants("tree", "diameter");
        let tree = service.registry().get("tree").unwrap().clone();
        assert_eq!(
            service.field_level(editor, scope, &tree, "diameter").unwrap(),
            PermissionLevel::None
        );
    }

    #[test]
    fn test_duplicate_role_name_in_scope_rejected() {
        let (service, _, scope) = service();
        let err = service
            .register_role(Role::new(
                ROLE_PUBLIC,
                Some(scope),
                PermissionLevel::ReadOnly,
            ))
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_ROLE");
    }
}

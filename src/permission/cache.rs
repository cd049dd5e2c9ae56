//! Effective-permission cache
//!
//! Permission resolution is read-heavy, so resolved (role, scope, model)
//! entries are held process-wide behind a `RwLock`. The cache has no
//! TTL: correctness depends entirely on the mutation paths calling the
//! invalidation methods here, never on expiry. Every grant or role write
//! in the service invalidates the affected keys directly; there is no
//! implicit signal dispatch.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::model::{RoleId, ScopeId};

use super::level::PermissionLevel;

/// Resolved field levels for one (role, scope, model)
pub type EffectivePermissions = BTreeMap<String, PermissionLevel>;

type CacheKey = (RoleId, ScopeId, String);

/// Process-wide cache of resolved permission sets
#[derive(Debug, Default)]
pub struct PermissionCache {
    entries: RwLock<HashMap<CacheKey, Arc<EffectivePermissions>>>,
}

impl PermissionCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a cached entry
    pub fn get(&self, role: RoleId, scope: ScopeId, model: &str) -> Option<Arc<EffectivePermissions>> {
        self.entries
            .read()
            .unwrap()
            .get(&(role, scope, model.to_string()))
            .cloned()
    }

    /// Store a resolved entry
    pub fn insert(
        &self,
        role: RoleId,
        scope: ScopeId,
        model: &str,
        permissions: Arc<EffectivePermissions>,
    ) {
        self.entries
            .write()
            .unwrap()
            .insert((role, scope, model.to_string()), permissions);
    }

    /// Drop every entry for (scope, model), across all roles.
    ///
    /// Called by the grant mutation path.
    pub fn invalidate_model(&self, scope: ScopeId, model: &str) {
        self.entries
            .write()
            .unwrap()
            .retain(|(_, s, m), _| !(*s == scope && m == model));
    }

    /// Drop every entry for a role, across all scopes and models.
    ///
    /// Called by the role mutation path.
    pub fn invalidate_role(&self, role: RoleId) {
        self.entries.write().unwrap().retain(|(r, _, _), _| *r != role);
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

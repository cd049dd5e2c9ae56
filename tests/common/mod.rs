//! Shared test fixture: the inventory domain wired to an in-memory
//! backend, with the conventional administrator/editor/public roles
//! seeded at their default levels.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use canopy::audit::Journal;
use canopy::engine::AuditEngine;
use canopy::model::{Entity, EntityId, ModelRegistry, RoleId, ScopeId, UserId};
use canopy::permission::{standard_roles, FieldGrant, PermissionLevel, PermissionService};
use canopy::reputation::ReputationTable;
use canopy::storage::MemoryBackend;

pub struct Harness {
    pub engine: AuditEngine<MemoryBackend>,
    pub scope: ScopeId,
    pub admin_role: RoleId,
    pub editor_role: RoleId,
    /// Direct-everything user
    pub admin: UserId,
    /// Audited contributor
    pub editor: UserId,
    /// Unassigned user; falls back to the public role
    pub visitor: UserId,
}

pub fn harness() -> Harness {
    build(None, None)
}

pub fn harness_with_journal<J: Journal + 'static>(journal: Arc<J>) -> Harness {
    let journal: Arc<dyn Journal> = journal;
    build(Some(journal), None)
}

pub fn harness_with_reputation(table: ReputationTable) -> Harness {
    build(None, Some(table))
}

fn build(journal: Option<Arc<dyn Journal>>, reputation: Option<ReputationTable>) -> Harness {
    let registry = Arc::new(ModelRegistry::inventory());
    let permissions = Arc::new(PermissionService::new(Arc::clone(&registry)));
    let scope = ScopeId::new(1);

    let mut admin_role = RoleId::new(0);
    let mut editor_role = RoleId::new(0);
    for role in standard_roles(scope, ["plot", "tree"]) {
        let name = role.name.clone();
        let id = permissions.register_role(role).unwrap();
        match name.as_str() {
            "administrator" => admin_role = id,
            "editor" => editor_role = id,
            _ => {}
        }
        for model in ["plot", "tree"] {
            permissions.seed_model(id, scope, model).unwrap();
        }
    }

    let mut engine = AuditEngine::new(registry, permissions, MemoryBackend::new());
    if let Some(journal) = journal {
        engine = engine.with_journal(journal);
    }
    if let Some(table) = reputation {
        engine = engine.with_reputation(table);
    }

    let admin = UserId::new(1);
    let editor = UserId::new(2);
    engine.permissions().assign_role(admin, scope, admin_role).unwrap();
    engine.permissions().assign_role(editor, scope, editor_role).unwrap();

    Harness {
        engine,
        scope,
        admin_role,
        editor_role,
        admin,
        editor,
        visitor: UserId::new(9),
    }
}

impl Harness {
    pub fn grant(&self, role: RoleId, model: &str, field: &str, level: PermissionLevel) {
        self.engine
            .permissions()
            .upsert_grant(FieldGrant::new(model, field, role, self.scope, level))
            .unwrap();
    }

    /// Admin plants a plot; returns its id
    pub fn create_plot(&self) -> EntityId {
        let mut plot = Entity::new("plot", self.scope);
        plot.set("geom", json!({"x": -122.33, "y": 47.61}));
        plot.set("width", json!(8.0));
        let outcome = self.engine.save_with_user(&mut plot, self.admin).unwrap();
        assert!(outcome.persisted);
        outcome.entity_id
    }

    /// Admin plants a tree in a plot; returns its id
    pub fn create_tree(&self, plot: EntityId) -> EntityId {
        let mut tree = Entity::new("tree", self.scope);
        tree.set("plot", json!(plot.value()));
        tree.set("species", json!("red oak"));
        tree.set("diameter", json!(2.3));
        let outcome = self.engine.save_with_user(&mut tree, self.admin).unwrap();
        assert!(outcome.persisted);
        outcome.entity_id
    }
}

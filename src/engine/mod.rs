//! Audit engine
//!
//! The mutation pipeline every caller goes through: diff → gate →
//! route. Direct fields apply to the row and log audits; fields granted
//! `WRITE_WITH_AUDIT` queue as pending edits and leave the row
//! untouched; a whole insert by a user without direct create capability
//! queues against a reserved identity with no row at all. The
//! moderation workflow that later resolves those pending audits lives
//! in the `moderation` submodule.
//!
//! # Transactional boundaries
//!
//! - entity save + its audit batch + reputation update: one atomic unit
//! - one resolution + its marker audit + the entity mutation (if any) +
//!   reputation update: one atomic unit
//! - a batch resolution: one atomic unit; the first failure rolls back
//!   the entire batch
//!
//! The engine never suspends inside a transaction and never retries;
//! the journal and log lines are written only after commit.

mod context;
mod errors;
mod gate;
mod moderation;
mod tracker;

pub use context::OpContext;
pub use errors::{EngineError, EngineResult};
pub use gate::RoutedChange;
pub use moderation::ResolveOutcome;
pub use tracker::{diff, FieldChange};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::audit::{Audit, AuditAction, Journal};
use crate::model::{
    Entity, EntityId, FieldKind, ModelDef, ModelRegistry, UserId, IDENTITY_FIELD,
};
use crate::observability::{log_event, EngineEvent};
use crate::permission::{CreateCapability, PermissionService};
use crate::reputation::ReputationTable;
use crate::storage::{Backend, EntityRow, StorageError, Transaction};

/// Result of one save
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// Identity of the entity; for a pending insert this is the
    /// reserved identity the queued audits share
    pub entity_id: EntityId,
    /// Whether a row exists after the save
    pub persisted: bool,
    /// Audits written by the save
    pub audits: Vec<Audit>,
    /// Fields that queued as pending edits instead of applying
    pub pending_fields: Vec<String>,
}

/// The audit engine: permission-checked, audited mutations over a
/// storage backend
pub struct AuditEngine<B: Backend> {
    registry: Arc<ModelRegistry>,
    permissions: Arc<PermissionService>,
    backend: B,
    reputation: ReputationTable,
    journal: Option<Arc<dyn Journal>>,
}

impl<B: Backend> AuditEngine<B> {
    /// Create an engine over the given registry, permission service,
    /// and backend
    pub fn new(
        registry: Arc<ModelRegistry>,
        permissions: Arc<PermissionService>,
        backend: B,
    ) -> Self {
        Self {
            registry,
            permissions,
            backend,
            reputation: ReputationTable::new(),
            journal: None,
        }
    }

    /// Attach a reputation scoring table
    pub fn with_reputation(mut self, reputation: ReputationTable) -> Self {
        self.reputation = reputation;
        self
    }

    /// Attach a durable audit journal
    pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// The model registry
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The permission service
    pub fn permissions(&self) -> &PermissionService {
        &self.permissions
    }

    /// The storage backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ==================
    // Inbound surface
    // ==================

    /// Save an entity on behalf of a user, computing the diff from the
    /// entity's snapshot.
    pub fn save_with_user(&self, entity: &mut Entity, user: UserId) -> EngineResult<SaveOutcome> {
        let model = self.registry.get(entity.model())?.clone();
        let changes = tracker::diff(&model, entity)?;
        self.save_changes(entity, user, &model, changes)
    }

    /// Save with an explicit diff supplied by the caller (CSV importers
    /// compute their own); the diff still routes through the gate.
    pub fn save_with_user_diff(
        &self,
        entity: &mut Entity,
        user: UserId,
        changes: Vec<FieldChange>,
    ) -> EngineResult<SaveOutcome> {
        let model = self.registry.get(entity.model())?.clone();
        self.save_changes(entity, user, &model, changes)
    }

    /// Delete an entity on behalf of a user.
    pub fn delete_with_user(&self, entity: &Entity, user: UserId) -> EngineResult<Audit> {
        let ctx = OpContext::new(user);
        let model = self.registry.get(entity.model())?.clone();
        let id = entity.id().ok_or_else(|| EngineError::IntegrityViolation {
            model: model.name.clone(),
            detail: "cannot delete an unsaved entity".to_string(),
        })?;
        let scope = entity.scope();
        let role_id = self.permissions.role_of(user, scope)?;
        let role = self.permissions.role(role_id)?;
        gate::check_delete(&role, &model, entity, user)?;

        let audit = self.backend.transaction(|txn| {
            if !txn.entity_exists(&model.name, id) {
                return Err(EngineError::Storage(StorageError::EntityNotFound {
                    model: model.name.clone(),
                    id,
                }));
            }
            txn.delete_entity(&model.name, id)?;
            let audit = Audit::new(
                txn.reserve_audit_id(),
                &model.name,
                id,
                scope,
                user,
                AuditAction::Delete,
            );
            txn.append_audits(std::slice::from_ref(&audit))?;
            self.reputation.apply_created(txn, std::slice::from_ref(&audit));
            Ok(audit)
        })?;

        self.mirror(std::slice::from_ref(&audit));
        log_event(
            EngineEvent::EntityDeleted,
            &[
                ("entity", &id.to_string()),
                ("model", &model.name),
                ("op", &ctx.op_id.to_string()),
                ("user", &user.to_string()),
            ],
        );
        Ok(audit)
    }

    /// Load an entity by (model, id); the returned entity has its
    /// snapshot captured, so a subsequent diff starts clean.
    pub fn fetch(&self, model: &str, id: EntityId) -> EngineResult<Option<Entity>> {
        self.registry.get(model)?;
        let row = self
            .backend
            .transaction::<_, EngineError, _>(|txn| Ok(txn.fetch_entity(model, id)))?;
        Ok(row.map(|row| {
            Entity::from_persisted(row.model, row.id, row.scope, row.created_by, row.fields)
        }))
    }

    // ==================
    // Save pipeline
    // ==================

    fn save_changes(
        &self,
        entity: &mut Entity,
        user: UserId,
        model: &ModelDef,
        changes: Vec<FieldChange>,
    ) -> EngineResult<SaveOutcome> {
        let ctx = OpContext::new(user);
        let role_id = self.permissions.role_of(user, entity.scope())?;
        let outcome = match entity.id() {
            Some(id) => self.save_update(entity, user, model, role_id, id, changes)?,
            None => self.save_insert(entity, user, model, role_id, changes)?,
        };
        self.mirror(&outcome.audits);

        let event = if !outcome.persisted {
            EngineEvent::InsertQueued
        } else if outcome.pending_fields.is_empty() {
            EngineEvent::SaveApplied
        } else {
            EngineEvent::EditQueued
        };
        log_event(
            event,
            &[
                ("audits", &outcome.audits.len().to_string()),
                ("elapsed_ms", &ctx.elapsed_ms().to_string()),
                ("entity", &outcome.entity_id.to_string()),
                ("model", &model.name),
                ("op", &ctx.op_id.to_string()),
                ("pending", &outcome.pending_fields.len().to_string()),
                ("user", &user.to_string()),
            ],
        );
        Ok(outcome)
    }

    fn save_update(
        &self,
        entity: &mut Entity,
        user: UserId,
        model: &ModelDef,
        role_id: crate::model::RoleId,
        id: EntityId,
        changes: Vec<FieldChange>,
    ) -> EngineResult<SaveOutcome> {
        let scope = entity.scope();
        let routed =
            gate::route_changes(&self.permissions, role_id, scope, model, changes, user)?;

        let audits = self.backend.transaction(|txn| {
            if !txn.entity_exists(&model.name, id) {
                return Err(EngineError::Storage(StorageError::EntityNotFound {
                    model: model.name.clone(),
                    id,
                }));
            }
            let mut audits = Vec::with_capacity(routed.len());
            for rc in &routed {
                let def = model.field_def(&rc.change.field)?;
                check_reference(txn, model, &rc.change.field, &def.kind, &rc.change.current, rc.pending)?;
                let mut audit = Audit::new(
                    txn.reserve_audit_id(),
                    &model.name,
                    id,
                    scope,
                    user,
                    AuditAction::Update,
                )
                .with_field(&rc.change.field)
                .with_values(
                    rc.change.previous.as_ref().map(|v| def.kind.encode(v)),
                    rc.change.current.as_ref().map(|v| def.kind.encode(v)),
                );
                if rc.pending {
                    audit = audit.pending();
                } else {
                    let value = rc.change.current.clone().unwrap_or(Value::Null);
                    txn.set_entity_field(&model.name, id, &rc.change.field, value)?;
                }
                audits.push(audit);
            }
            txn.append_audits(&audits)?;
            self.reputation.apply_created(txn, &audits);
            Ok(audits)
        })?;

        // Pending fields never drift ahead of the row: roll the
        // in-memory value back before the snapshot is recaptured
        let pending_fields: Vec<String> = audits
            .iter()
            .filter(|a| a.requires_auth)
            .filter_map(|a| a.field.clone())
            .collect();
        for field in &pending_fields {
            entity.revert_field(field);
        }
        entity.capture_snapshot();

        Ok(SaveOutcome {
            entity_id: id,
            persisted: true,
            audits,
            pending_fields,
        })
    }

    fn save_insert(
        &self,
        entity: &mut Entity,
        user: UserId,
        model: &ModelDef,
        role_id: crate::model::RoleId,
        changes: Vec<FieldChange>,
    ) -> EngineResult<SaveOutcome> {
        let scope = entity.scope();
        let role = self.permissions.role(role_id)?;
        let capability = gate::check_create(&role, model, user)?;
        let routed =
            gate::route_changes(&self.permissions, role_id, scope, model, changes, user)?;
        let queue_whole_insert =
            capability == CreateCapability::Pending || routed.iter().any(|rc| rc.pending);

        if !queue_whole_insert {
            let (id, audits) = self.backend.transaction(|txn| {
                for field in model.required_fields() {
                    let present = routed
                        .iter()
                        .any(|rc| rc.change.field == field && rc.change.current.is_some());
                    if !present {
                        return Err(EngineError::Model(crate::model::ModelError::MissingRequired {
                            model: model.name.clone(),
                            field: field.to_string(),
                        }));
                    }
                }
                for rc in &routed {
                    let def = model.field_def(&rc.change.field)?;
                    check_reference(txn, model, &rc.change.field, &def.kind, &rc.change.current, false)?;
                }

                let id = txn.reserve_entity_id(&model.name);
                let mut fields = BTreeMap::new();
                for rc in &routed {
                    if let Some(value) = &rc.change.current {
                        fields.insert(rc.change.field.clone(), value.clone());
                    }
                }
                txn.insert_entity(EntityRow {
                    model: model.name.clone(),
                    id,
                    scope,
                    created_by: Some(user),
                    fields,
                })?;

                let mut audits = insert_audits(txn, model, id, scope, user, &routed, false)?;
                audits.push(identity_audit(txn, model, id, scope, user, false));
                txn.append_audits(&audits)?;
                self.reputation.apply_created(txn, &audits);
                Ok::<_, EngineError>((id, audits))
            })?;

            entity.set_created_by(user);
            entity.mark_persisted(id);
            return Ok(SaveOutcome {
                entity_id: id,
                persisted: true,
                audits,
                pending_fields: Vec::new(),
            });
        }

        // Pending insert: reserve an identity, queue every diff against
        // it, persist no row. The entity stays unsaved until the
        // identity audit is approved.
        let (id, audits) = self.backend.transaction(|txn| {
            for rc in &routed {
                let def = model.field_def(&rc.change.field)?;
                check_reference(txn, model, &rc.change.field, &def.kind, &rc.change.current, true)?;
            }
            let id = txn.reserve_entity_id(&model.name);
            let mut audits = insert_audits(txn, model, id, scope, user, &routed, true)?;
            audits.push(identity_audit(txn, model, id, scope, user, true));
            txn.append_audits(&audits)?;
            self.reputation.apply_created(txn, &audits);
            Ok::<_, EngineError>((id, audits))
        })?;

        let pending_fields = routed.iter().map(|rc| rc.change.field.clone()).collect();
        Ok(SaveOutcome {
            entity_id: id,
            persisted: false,
            audits,
            pending_fields,
        })
    }

    /// Mirror committed audits to the durable journal. Journal failure
    /// is reported but never decides an engine outcome.
    fn mirror(&self, audits: &[Audit]) {
        let journal = match &self.journal {
            Some(journal) => journal,
            None => return,
        };
        for audit in audits {
            if let Err(err) = journal.append(audit) {
                log_event(
                    EngineEvent::JournalAppendFailed,
                    &[
                        ("audit", &audit.id.to_string()),
                        ("error", &err.to_string()),
                    ],
                );
            }
        }
    }
}

fn insert_audits(
    txn: &mut dyn Transaction,
    model: &ModelDef,
    id: EntityId,
    scope: crate::model::ScopeId,
    user: UserId,
    routed: &[RoutedChange],
    pending: bool,
) -> EngineResult<Vec<Audit>> {
    let mut audits = Vec::with_capacity(routed.len() + 1);
    for rc in routed {
        let def = model.field_def(&rc.change.field)?;
        let mut audit = Audit::new(
            txn.reserve_audit_id(),
            &model.name,
            id,
            scope,
            user,
            AuditAction::Insert,
        )
        .with_field(&rc.change.field)
        .with_values(None, rc.change.current.as_ref().map(|v| def.kind.encode(v)));
        if pending {
            audit = audit.pending();
        }
        audits.push(audit);
    }
    Ok(audits)
}

fn identity_audit(
    txn: &mut dyn Transaction,
    model: &ModelDef,
    id: EntityId,
    scope: crate::model::ScopeId,
    user: UserId,
    pending: bool,
) -> Audit {
    let mut audit = Audit::new(
        txn.reserve_audit_id(),
        &model.name,
        id,
        scope,
        user,
        AuditAction::Insert,
    )
    .with_field(IDENTITY_FIELD)
    .with_values(None, Some(id.value().to_string()));
    if pending {
        audit = audit.pending();
    }
    audit
}

fn check_reference(
    txn: &dyn Transaction,
    model: &ModelDef,
    field: &str,
    kind: &FieldKind,
    current: &Option<Value>,
    allow_reserved: bool,
) -> EngineResult<()> {
    let (target_model, value) = match (kind, current) {
        (FieldKind::Reference { model }, Some(value)) => (model, value),
        _ => return Ok(()),
    };
    let target = value
        .as_u64()
        .map(EntityId::new)
        .ok_or_else(|| crate::model::ModelError::TypeMismatch {
            model: model.name.clone(),
            field: field.to_string(),
            expected: "reference",
            actual: value.to_string(),
        })?;
    let resolves = txn.entity_exists(target_model, target)
        || (allow_reserved && txn.identity_reserved(target_model, target));
    if resolves {
        Ok(())
    } else {
        Err(EngineError::ForeignKeyMissing {
            model: model.name.clone(),
            field: field.to_string(),
            target_model: target_model.clone(),
            target,
        })
    }
}

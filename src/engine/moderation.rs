//! Moderation workflow
//!
//! Resolves audits. Two distinct paths share the marker/pointer
//! mechanics but differ in what they touch:
//!
//! - **Pending resolution** (`approve_or_reject`): the audit is an
//!   unapplied pending edit. Approval applies the stored value onto the
//!   live row through a low-level write; for an identity audit it
//!   concretizes the whole pending insert from its approved siblings.
//!   Rejection of an identity audit cascades to every unresolved
//!   sibling; rejection of a field audit touches nothing.
//! - **Retroactive review** (`review_existing_edit`): the audit was
//!   applied directly at save time. Approval is an annotation.
//!   Rejection reverts the live value only while the audit is still the
//!   most recent change for its field; a stale rejection never clobbers
//!   newer data. Rejecting the identity audit of an applied insert
//!   deletes the row.
//!
//! Either path fails with `AlreadyResolved` once the resolution pointer
//! is set; it is set exactly once, ever. The approving user's
//! permission is re-verified at resolution time; queue-time permission
//! is never trusted across the moderation boundary.

use serde_json::Value;

use crate::audit::{Audit, AuditAction};
use crate::model::{AuditId, ModelDef, UserId};
use crate::observability::{log_event, EngineEvent};
use crate::permission::CreateCapability;
use crate::storage::{Backend, EntityRow, StorageError, Transaction};

use super::errors::{EngineError, EngineResult};
use super::{AuditEngine, OpContext};

/// Result of resolving one audit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
    /// The resolved audit
    pub audit: AuditId,
    /// The marker audit its resolution pointer now references
    pub marker: AuditId,
    /// Whether the resolution was an approval
    pub approved: bool,
    /// Whether an identity approval concretized a pending insert
    pub concretized: bool,
    /// Whether a review rejection changed or deleted the live row
    pub reverted: bool,
    /// Sibling pending audits rejected by an identity rejection
    pub cascaded: Vec<AuditId>,
}

impl<B: Backend> AuditEngine<B> {
    /// Approve or reject one pending edit.
    pub fn approve_or_reject(
        &self,
        audit_id: AuditId,
        user: UserId,
        approved: bool,
    ) -> EngineResult<ResolveOutcome> {
        let ctx = OpContext::new(user);
        let (outcome, created) = self.backend.transaction(|txn| {
            let mut created = Vec::new();
            let outcome = self.resolve_pending_in_txn(txn, audit_id, user, approved, &mut created)?;
            Ok::<_, EngineError>((outcome, created))
        })?;
        self.mirror(&created);
        self.log_resolution(&ctx, &outcome, "pending");
        Ok(outcome)
    }

    /// Retroactively review one already-applied direct edit.
    pub fn review_existing_edit(
        &self,
        audit_id: AuditId,
        user: UserId,
        approved: bool,
    ) -> EngineResult<ResolveOutcome> {
        let ctx = OpContext::new(user);
        let (outcome, created) = self.backend.transaction(|txn| {
            let mut created = Vec::new();
            let outcome = self.review_in_txn(txn, audit_id, user, approved, &mut created)?;
            Ok::<_, EngineError>((outcome, created))
        })?;
        self.mirror(&created);
        self.log_resolution(&ctx, &outcome, "review");
        Ok(outcome)
    }

    /// Resolve a batch of audits as one atomic unit.
    ///
    /// Non-identity audits resolve first; identity audits resolve last,
    /// ordered by the registry's dependency order so a container model
    /// concretizes before the entities that reference it. The first
    /// failure rolls back the entire batch.
    pub fn approve_or_reject_many(
        &self,
        audit_ids: &[AuditId],
        user: UserId,
        approved: bool,
    ) -> EngineResult<Vec<ResolveOutcome>> {
        let ctx = OpContext::new(user);
        let (outcomes, created) = self.backend.transaction(|txn| {
            let mut audits = Vec::with_capacity(audit_ids.len());
            for id in audit_ids {
                let audit = txn
                    .audit(*id)
                    .ok_or(EngineError::Storage(StorageError::AuditNotFound(*id)))?;
                audits.push(audit);
            }
            audits.sort_by_key(|a| {
                let identity = a.is_identity();
                let rank = if identity {
                    self.registry.dependency_rank(&a.model)
                } else {
                    0
                };
                (identity, rank, a.id)
            });

            let mut created = Vec::new();
            let mut outcomes = Vec::with_capacity(audits.len());
            for audit in &audits {
                let outcome = if audit.requires_auth {
                    self.resolve_pending_in_txn(txn, audit.id, user, approved, &mut created)?
                } else {
                    self.review_in_txn(txn, audit.id, user, approved, &mut created)?
                };
                outcomes.push(outcome);
            }
            Ok::<_, EngineError>((outcomes, created))
        })?;
        self.mirror(&created);
        log_event(
            EngineEvent::BatchResolved,
            &[
                ("approved", if approved { "true" } else { "false" }),
                ("count", &outcomes.len().to_string()),
                ("op", &ctx.op_id.to_string()),
                ("user", &user.to_string()),
            ],
        );
        Ok(outcomes)
    }

    // ==================
    // Pending resolution
    // ==================

    fn resolve_pending_in_txn(
        &self,
        txn: &mut dyn Transaction,
        audit_id: AuditId,
        user: UserId,
        approved: bool,
        created: &mut Vec<Audit>,
    ) -> EngineResult<ResolveOutcome> {
        let audit = txn
            .audit(audit_id)
            .ok_or(EngineError::Storage(StorageError::AuditNotFound(audit_id)))?;
        if audit.is_resolved() {
            return Err(EngineError::AlreadyResolved { audit: audit_id });
        }
        if !audit.requires_auth {
            return Err(EngineError::NotPending { audit: audit_id });
        }
        let model = self.registry.get(&audit.model)?.clone();
        self.require_resolver_authority(&audit, &model, user)?;

        let mut concretized = false;
        let mut cascaded = Vec::new();

        if approved {
            if audit.is_identity() {
                concretized = self.concretize_insert(txn, &model, &audit)?;
            } else if let Some(field) = audit.field.as_deref() {
                if txn.entity_exists(&audit.model, audit.model_id) {
                    let def = model.field_def(field)?;
                    let value = match audit.current_value.as_deref() {
                        Some(raw) => def.kind.decode(&model.name, field, raw)?,
                        None => Value::Null,
                    };
                    txn.set_entity_field(&audit.model, audit.model_id, field, value)?;
                } else if !txn.identity_reserved(&audit.model, audit.model_id) {
                    return Err(EngineError::Storage(StorageError::EntityNotFound {
                        model: audit.model.clone(),
                        id: audit.model_id,
                    }));
                }
                // Row not concretized yet: the approved value folds in
                // when the identity audit is approved
            }
        } else if audit.is_identity() {
            // No entity is ever created: every unresolved sibling falls
            // with the identity
            for sibling in txn.audits_for_entity(&audit.model, audit.model_id) {
                if sibling.id == audit.id || !sibling.is_pending() {
                    continue;
                }
                let marker =
                    self.append_marker(txn, &sibling, user, AuditAction::PendingReject, created)?;
                txn.set_audit_ref(sibling.id, marker)?;
                self.reputation.apply_resolved(txn, &sibling, false);
                cascaded.push(sibling.id);
            }
        }

        let marker_action = if approved {
            AuditAction::PendingApprove
        } else {
            AuditAction::PendingReject
        };
        let marker = self.append_marker(txn, &audit, user, marker_action, created)?;
        txn.set_audit_ref(audit.id, marker)?;
        self.reputation.apply_resolved(txn, &audit, approved);

        Ok(ResolveOutcome {
            audit: audit.id,
            marker,
            approved,
            concretized,
            reverted: false,
            cascaded,
        })
    }

    /// Build a row for a pending insert out of its approved siblings.
    ///
    /// Returns `false` when the row already exists (the approval is a
    /// no-op concretization). Fails closed with an integrity violation
    /// when a required field has no approved value or a referenced row
    /// is dead; callers are expected to approve field audits before the
    /// identity audit.
    fn concretize_insert(
        &self,
        txn: &mut dyn Transaction,
        model: &ModelDef,
        identity: &Audit,
    ) -> EngineResult<bool> {
        if txn.entity_exists(&identity.model, identity.model_id) {
            return Ok(false);
        }

        let mut fields = std::collections::BTreeMap::new();
        for sibling in txn.audits_for_entity(&identity.model, identity.model_id) {
            if sibling.is_identity() || !sibling.action.is_change() {
                continue;
            }
            let approved = sibling
                .ref_id
                .and_then(|marker| txn.audit(marker))
                .map(|marker| marker.action.is_approval())
                .unwrap_or(false);
            if !approved {
                continue;
            }
            if let (Some(field), Some(raw)) =
                (sibling.field.as_deref(), sibling.current_value.as_deref())
            {
                let def = model.field_def(field)?;
                // Oldest-first iteration: a later approved value wins
                fields.insert(
                    field.to_string(),
                    def.kind.decode(&model.name, field, raw)?,
                );
            }
        }

        for field in model.required_fields() {
            if !fields.contains_key(field) {
                return Err(EngineError::IntegrityViolation {
                    model: model.name.clone(),
                    detail: format!(
                        "cannot concretize insert {}: required field '{}' has no approved value",
                        identity.model_id, field
                    ),
                });
            }
        }
        for (field, value) in &fields {
            let def = model.field_def(field)?;
            if let crate::model::FieldKind::Reference { model: target_model } = &def.kind {
                let target = value
                    .as_u64()
                    .map(crate::model::EntityId::new)
                    .filter(|t| txn.entity_exists(target_model, *t));
                if target.is_none() {
                    return Err(EngineError::IntegrityViolation {
                        model: model.name.clone(),
                        detail: format!(
                            "cannot concretize insert {}: '{}' references no live {} row",
                            identity.model_id, field, target_model
                        ),
                    });
                }
            }
        }

        txn.insert_entity(EntityRow {
            model: identity.model.clone(),
            id: identity.model_id,
            scope: identity.scope,
            created_by: Some(identity.user),
            fields,
        })?;
        Ok(true)
    }

    // ==================
    // Retroactive review
    // ==================

    fn review_in_txn(
        &self,
        txn: &mut dyn Transaction,
        audit_id: AuditId,
        user: UserId,
        approved: bool,
        created: &mut Vec<Audit>,
    ) -> EngineResult<ResolveOutcome> {
        let audit = txn
            .audit(audit_id)
            .ok_or(EngineError::Storage(StorageError::AuditNotFound(audit_id)))?;
        if audit.is_resolved() {
            return Err(EngineError::AlreadyResolved { audit: audit_id });
        }
        if audit.requires_auth {
            return Err(EngineError::PendingEdit { audit: audit_id });
        }
        let model = self.registry.get(&audit.model)?.clone();
        self.require_resolver_authority(&audit, &model, user)?;

        let mut reverted = false;
        if !approved {
            if audit.is_identity() {
                // Rejecting an applied insert removes the row outright
                if txn.entity_exists(&audit.model, audit.model_id) {
                    txn.delete_entity(&audit.model, audit.model_id)?;
                    reverted = true;
                }
            } else if let Some(field) = audit.field.as_deref() {
                // Only the most recent change for the field may revert
                // the live value; a stale rejection is marker-only
                let still_current = txn
                    .latest_change_for_field(&audit.model, audit.model_id, field)
                    .map(|latest| latest.id == audit.id)
                    .unwrap_or(false);
                if still_current && txn.entity_exists(&audit.model, audit.model_id) {
                    let def = model.field_def(field)?;
                    let value = match audit.previous_value.as_deref() {
                        Some(raw) => def.kind.decode(&model.name, field, raw)?,
                        None => Value::Null,
                    };
                    txn.set_entity_field(&audit.model, audit.model_id, field, value)?;
                    reverted = true;
                }
            }
        }

        let marker_action = if approved {
            AuditAction::ReviewApprove
        } else {
            AuditAction::ReviewReject
        };
        let marker = self.append_marker(txn, &audit, user, marker_action, created)?;
        txn.set_audit_ref(audit.id, marker)?;
        self.reputation.apply_resolved(txn, &audit, approved);

        Ok(ResolveOutcome {
            audit: audit.id,
            marker,
            approved,
            concretized: false,
            reverted,
            cascaded: Vec::new(),
        })
    }

    // ==================
    // Shared mechanics
    // ==================

    /// The resolver must hold direct authority over what the audit
    /// touches: direct create capability for identity audits, delete
    /// capability for delete audits, `WRITE_DIRECTLY` for field audits.
    fn require_resolver_authority(
        &self,
        audit: &Audit,
        model: &ModelDef,
        user: UserId,
    ) -> EngineResult<()> {
        let role_id = self.permissions.role_of(user, audit.scope)?;
        if audit.is_identity() {
            let role = self.permissions.role(role_id)?;
            if role.can_create(&audit.model) != CreateCapability::Direct {
                return Err(EngineError::Authorization {
                    user,
                    action: "resolve an insert of",
                    target: audit.model.clone(),
                });
            }
            return Ok(());
        }
        match audit.field.as_deref() {
            Some(field) => {
                let level = self.permissions.field_level(role_id, audit.scope, model, field)?;
                if level != crate::permission::PermissionLevel::WriteDirectly {
                    return Err(EngineError::Authorization {
                        user,
                        action: "resolve an edit of",
                        target: format!("{}.{}", audit.model, field),
                    });
                }
                Ok(())
            }
            None => {
                let role = self.permissions.role(role_id)?;
                if !role.can_delete(&audit.model) {
                    return Err(EngineError::Authorization {
                        user,
                        action: "resolve a delete of",
                        target: audit.model.clone(),
                    });
                }
                Ok(())
            }
        }
    }

    fn append_marker(
        &self,
        txn: &mut dyn Transaction,
        original: &Audit,
        user: UserId,
        action: AuditAction,
        created: &mut Vec<Audit>,
    ) -> EngineResult<AuditId> {
        let mut marker = Audit::new(
            txn.reserve_audit_id(),
            &original.model,
            original.model_id,
            original.scope,
            user,
            action,
        );
        if let Some(field) = &original.field {
            marker = marker.with_field(field);
        }
        txn.append_audits(std::slice::from_ref(&marker))?;
        let id = marker.id;
        created.push(marker);
        Ok(id)
    }

    fn log_resolution(&self, ctx: &OpContext, outcome: &ResolveOutcome, kind: &str) {
        let event = if outcome.approved {
            EngineEvent::AuditApproved
        } else {
            EngineEvent::AuditRejected
        };
        log_event(
            event,
            &[
                ("audit", &outcome.audit.to_string()),
                ("cascaded", &outcome.cascaded.len().to_string()),
                ("elapsed_ms", &ctx.elapsed_ms().to_string()),
                ("kind", kind),
                ("marker", &outcome.marker.to_string()),
                ("op", &ctx.op_id.to_string()),
                ("user", &ctx.user.to_string()),
            ],
        );
        if outcome.concretized {
            log_event(
                EngineEvent::InsertConcretized,
                &[
                    ("audit", &outcome.audit.to_string()),
                    ("op", &ctx.op_id.to_string()),
                ],
            );
        }
        if outcome.reverted {
            log_event(
                EngineEvent::EditReverted,
                &[
                    ("audit", &outcome.audit.to_string()),
                    ("op", &ctx.op_id.to_string()),
                ],
            );
        }
    }
}

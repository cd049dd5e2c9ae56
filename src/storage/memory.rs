//! In-memory backend
//!
//! Reference `Backend` implementation: whole-state staging. A
//! transaction clones the current state, runs against the clone, and
//! swaps it in on `Ok`; an `Err` drops the clone, so partial work is
//! never visible. Sequences live outside the staged state, which makes
//! identity reservation survive rollback exactly as a database sequence
//! would.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::Value;

use crate::audit::Audit;
use crate::model::{AuditId, EntityId, UserId};

use super::backend::{Backend, EntityRow, Transaction, UserRow};
use super::errors::{StorageError, StorageResult};
use super::sequence::{IdentitySequence, Sequence};

#[derive(Debug, Clone, Default)]
struct State {
    entities: BTreeMap<(String, u64), EntityRow>,
    audits: BTreeMap<u64, Audit>,
    users: BTreeMap<u64, UserRow>,
}

/// In-memory transactional backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
    entity_ids: IdentitySequence,
    audit_ids: Sequence,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
    {
        let mut guard = self.state.write().unwrap();
        let mut staged = MemoryTransaction {
            state: guard.clone(),
            entity_ids: &self.entity_ids,
            audit_ids: &self.audit_ids,
        };
        match f(&mut staged) {
            Ok(value) => {
                *guard = staged.state;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }
}

struct MemoryTransaction<'a> {
    state: State,
    entity_ids: &'a IdentitySequence,
    audit_ids: &'a Sequence,
}

impl Transaction for MemoryTransaction<'_> {
    fn fetch_entity(&self, model: &str, id: EntityId) -> Option<EntityRow> {
        self.state
            .entities
            .get(&(model.to_string(), id.value()))
            .cloned()
    }

    fn entity_exists(&self, model: &str, id: EntityId) -> bool {
        self.state
            .entities
            .contains_key(&(model.to_string(), id.value()))
    }

    fn identity_reserved(&self, model: &str, id: EntityId) -> bool {
        id.value() > 0 && id.value() <= self.entity_ids.high_water(model)
    }

    fn insert_entity(&mut self, row: EntityRow) -> StorageResult<()> {
        let key = (row.model.clone(), row.id.value());
        if self.state.entities.contains_key(&key) {
            return Err(StorageError::DuplicateEntity {
                model: row.model,
                id: row.id,
            });
        }
        self.state.entities.insert(key, row);
        Ok(())
    }

    fn set_entity_field(
        &mut self,
        model: &str,
        id: EntityId,
        field: &str,
        value: Value,
    ) -> StorageResult<()> {
        let row = self
            .state
            .entities
            .get_mut(&(model.to_string(), id.value()))
            .ok_or_else(|| StorageError::EntityNotFound {
                model: model.to_string(),
                id,
            })?;
        if value.is_null() {
            row.fields.remove(field);
        } else {
            row.fields.insert(field.to_string(), value);
        }
        Ok(())
    }

    fn delete_entity(&mut self, model: &str, id: EntityId) -> StorageResult<()> {
        self.state
            .entities
            .remove(&(model.to_string(), id.value()))
            .map(|_| ())
            .ok_or_else(|| StorageError::EntityNotFound {
                model: model.to_string(),
                id,
            })
    }

    fn append_audits(&mut self, audits: &[Audit]) -> StorageResult<()> {
        for audit in audits {
            if self.state.audits.contains_key(&audit.id.value()) {
                return Err(StorageError::DuplicateAudit(audit.id));
            }
        }
        for audit in audits {
            self.state.audits.insert(audit.id.value(), audit.clone());
        }
        Ok(())
    }

    fn audit(&self, id: AuditId) -> Option<Audit> {
        self.state.audits.get(&id.value()).cloned()
    }

    fn set_audit_ref(&mut self, id: AuditId, ref_id: AuditId) -> StorageResult<()> {
        let audit = self
            .state
            .audits
            .get_mut(&id.value())
            .ok_or(StorageError::AuditNotFound(id))?;
        if audit.ref_id.is_some() {
            return Err(StorageError::RefAlreadySet(id));
        }
        audit.ref_id = Some(ref_id);
        Ok(())
    }

    fn audits_for_entity(&self, model: &str, id: EntityId) -> Vec<Audit> {
        // BTreeMap iteration yields ascending ids: oldest first
        self.state
            .audits
            .values()
            .filter(|a| a.model == model && a.model_id == id)
            .cloned()
            .collect()
    }

    fn latest_change_for_field(&self, model: &str, id: EntityId, field: &str) -> Option<Audit> {
        self.state
            .audits
            .values()
            .filter(|a| {
                a.model == model
                    && a.model_id == id
                    && a.field.as_deref() == Some(field)
                    && a.action.is_change()
            })
            .last()
            .cloned()
    }

    fn user(&self, id: UserId) -> Option<UserRow> {
        self.state.users.get(&id.value()).cloned()
    }

    fn upsert_user(&mut self, row: UserRow) {
        self.state.users.insert(row.id.value(), row);
    }

    fn reserve_entity_id(&mut self, model: &str) -> EntityId {
        EntityId::new(self.entity_ids.reserve(model))
    }

    fn reserve_audit_id(&mut self) -> AuditId {
        AuditId::new(self.audit_ids.reserve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditAction;
    use crate::model::ScopeId;
    use serde_json::json;

    fn row(id: u64) -> EntityRow {
        let mut fields = BTreeMap::new();
        fields.insert("species".to_string(), json!("oak"));
        EntityRow {
            model: "tree".to_string(),
            id: EntityId::new(id),
            scope: ScopeId::new(1),
            created_by: Some(UserId::new(1)),
            fields,
        }
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let backend = MemoryBackend::new();
        backend
            .transaction::<_, StorageError, _>(|txn| {
                let id = txn.reserve_entity_id("tree");
                txn.insert_entity(row(id.value()))?;
                Ok(())
            })
            .unwrap();
        backend
            .transaction::<_, StorageError, _>(|txn| {
                assert!(txn.entity_exists("tree", EntityId::new(1)));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_rollback_discards_all_staged_writes() {
        let backend = MemoryBackend::new();
        let result = backend.transaction::<(), StorageError, _>(|txn| {
            txn.insert_entity(row(1))?;
            txn.upsert_user(UserRow {
                id: UserId::new(1),
                reputation: 10,
            });
            Err(StorageError::EntityNotFound {
                model: "tree".to_string(),
                id: EntityId::new(99),
            })
        });
        assert!(result.is_err());
        backend
            .transaction::<_, StorageError, _>(|txn| {
                assert!(!txn.entity_exists("tree", EntityId::new(1)));
                assert!(txn.user(UserId::new(1)).is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_reservations_survive_rollback() {
        let backend = MemoryBackend::new();
        let _ = backend.transaction::<(), StorageError, _>(|txn| {
            let id = txn.reserve_entity_id("tree");
            assert_eq!(id, EntityId::new(1));
            Err(StorageError::EntityNotFound {
                model: "tree".to_string(),
                id,
            })
        });
        backend
            .transaction::<_, StorageError, _>(|txn| {
                // The wasted value is never handed out again
                assert_eq!(txn.reserve_entity_id("tree"), EntityId::new(2));
                assert!(txn.identity_reserved("tree", EntityId::new(1)));
                assert!(!txn.identity_reserved("tree", EntityId::new(3)));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_audit_ref_set_exactly_once() {
        let backend = MemoryBackend::new();
        let err = backend
            .transaction::<(), StorageError, _>(|txn| {
                let id = txn.reserve_audit_id();
                let marker = txn.reserve_audit_id();
                let audit = Audit::new(
                    id,
                    "tree",
                    EntityId::new(1),
                    ScopeId::new(1),
                    UserId::new(1),
                    AuditAction::Update,
                );
                txn.append_audits(&[audit])?;
                txn.set_audit_ref(id, marker)?;
                txn.set_audit_ref(id, marker)?;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.code(), "REF_ALREADY_SET");
    }

    #[test]
    fn test_latest_change_ignores_markers() {
        let backend = MemoryBackend::new();
        backend
            .transaction::<_, StorageError, _>(|txn| {
                let first = Audit::new(
                    txn.reserve_audit_id(),
                    "tree",
                    EntityId::new(1),
                    ScopeId::new(1),
                    UserId::new(1),
                    AuditAction::Update,
                )
                .with_field("width")
                .with_values(Some("1".into()), Some("444".into()));
                let second = Audit::new(
                    txn.reserve_audit_id(),
                    "tree",
                    EntityId::new(1),
                    ScopeId::new(1),
                    UserId::new(1),
                    AuditAction::Update,
                )
                .with_field("width")
                .with_values(Some("444".into()), Some("555".into()));
                let marker = Audit::new(
                    txn.reserve_audit_id(),
                    "tree",
                    EntityId::new(1),
                    ScopeId::new(1),
                    UserId::new(2),
                    AuditAction::ReviewApprove,
                )
                .with_field("width");
                txn.append_audits(&[first, second, marker])?;
                let latest = txn.latest_change_for_field("tree", EntityId::new(1), "width");
                assert_eq!(latest.unwrap().current_value.as_deref(), Some("555"));
                Ok::<_, StorageError>(())
            })
            .unwrap();
    }
}

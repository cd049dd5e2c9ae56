//! Backend contract
//!
//! The engine runs every operation inside one storage transaction
//! supplied by the backend: entity save plus its audit batch plus the
//! reputation update commit together or not at all. The engine never
//! suspends inside a transaction and never retries one; a failed
//! closure must leave no partial state visible.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::audit::Audit;
use crate::model::{AuditId, EntityId, ScopeId, UserId};

use super::errors::StorageResult;

/// One persisted entity row
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    /// Model name
    pub model: String,
    /// Row identity
    pub id: EntityId,
    /// Scope partition
    pub scope: ScopeId,
    /// Creating user, when known (drives the creator delete override)
    pub created_by: Option<UserId>,
    /// Field values
    pub fields: BTreeMap<String, Value>,
}

/// One persisted user row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    /// User identity
    pub id: UserId,
    /// Reputation score; never negative
    pub reputation: u64,
}

/// Storage backend: supplies transactions
pub trait Backend {
    /// Run `f` inside one atomic transaction. Commit on `Ok`, discard
    /// every staged change on `Err`.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>;
}

/// Staged view of storage inside one transaction
pub trait Transaction {
    // ==================
    // Entity rows
    // ==================

    /// Fetch an entity row
    fn fetch_entity(&self, model: &str, id: EntityId) -> Option<EntityRow>;

    /// Whether a live row exists for (model, id)
    fn entity_exists(&self, model: &str, id: EntityId) -> bool;

    /// Whether an identity has been handed out for this model, live row
    /// or not. Pending inserts may reference identities that are
    /// reserved but not yet concretized.
    fn identity_reserved(&self, model: &str, id: EntityId) -> bool;

    /// Insert a new row
    fn insert_entity(&mut self, row: EntityRow) -> StorageResult<()>;

    /// Low-level single-field write, bypassing all audit machinery
    fn set_entity_field(
        &mut self,
        model: &str,
        id: EntityId,
        field: &str,
        value: Value,
    ) -> StorageResult<()>;

    /// Remove a row
    fn delete_entity(&mut self, model: &str, id: EntityId) -> StorageResult<()>;

    // ==================
    // Audit rows
    // ==================

    /// Append a batch of audit rows
    fn append_audits(&mut self, audits: &[Audit]) -> StorageResult<()>;

    /// Fetch an audit row
    fn audit(&self, id: AuditId) -> Option<Audit>;

    /// Set an audit's resolution pointer; fails if already set
    fn set_audit_ref(&mut self, id: AuditId, ref_id: AuditId) -> StorageResult<()>;

    /// All audits for (model, id), ordered oldest first
    fn audits_for_entity(&self, model: &str, id: EntityId) -> Vec<Audit>;

    /// Most recent value-bearing audit for (model, id, field)
    fn latest_change_for_field(&self, model: &str, id: EntityId, field: &str) -> Option<Audit>;

    // ==================
    // Users
    // ==================

    /// Fetch a user row
    fn user(&self, id: UserId) -> Option<UserRow>;

    /// Insert or replace a user row
    fn upsert_user(&mut self, row: UserRow);

    // ==================
    // Sequences
    // ==================

    /// Reserve the next entity identity for a model. Reservations
    /// survive rollback; a discarded transaction wastes the value.
    fn reserve_entity_id(&mut self, model: &str) -> EntityId;

    /// Reserve the next audit identity
    fn reserve_audit_id(&mut self) -> AuditId;
}

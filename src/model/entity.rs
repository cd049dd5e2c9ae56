//! Tracked entities
//!
//! An `Entity` is the in-memory representation of one domain row: its
//! model name, optional persisted identity, scope, current field values,
//! and the previous-state snapshot that change tracking diffs against.
//!
//! Snapshot lifecycle:
//! - empty immediately after construction (an unsaved entity has no
//!   previous state, so fields set at construction read as "new")
//! - refreshed after every successful save, so the next diff is computed
//!   against the just-saved state

use std::collections::BTreeMap;

use serde_json::Value;

use super::ids::{EntityId, ScopeId, UserId};

/// In-memory domain entity with a previous-state snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    model: String,
    id: Option<EntityId>,
    scope: ScopeId,
    created_by: Option<UserId>,
    fields: BTreeMap<String, Value>,
    snapshot: BTreeMap<String, Value>,
}

impl Entity {
    /// Create a new unsaved entity with an empty snapshot
    pub fn new(model: impl Into<String>, scope: ScopeId) -> Self {
        Self {
            model: model.into(),
            id: None,
            scope,
            created_by: None,
            fields: BTreeMap::new(),
            snapshot: BTreeMap::new(),
        }
    }

    /// Rehydrate a persisted entity; the snapshot is captured from the
    /// given fields so a subsequent diff starts clean.
    pub fn from_persisted(
        model: impl Into<String>,
        id: EntityId,
        scope: ScopeId,
        created_by: Option<UserId>,
        fields: BTreeMap<String, Value>,
    ) -> Self {
        let mut entity = Self {
            model: model.into(),
            id: Some(id),
            scope,
            created_by,
            fields,
            snapshot: BTreeMap::new(),
        };
        entity.capture_snapshot();
        entity
    }

    /// Model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Persisted identity, if any
    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    /// Scope the entity belongs to
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// User that created the entity, if known
    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    /// Record the creating user
    pub fn set_created_by(&mut self, user: UserId) {
        self.created_by = Some(user);
    }

    /// Current value of a field; explicit nulls read as absent
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// Set a field value; setting null clears the field
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        if value.is_null() {
            self.fields.remove(&field);
        } else {
            self.fields.insert(field, value);
        }
    }

    /// Clear a field
    pub fn clear(&mut self, field: &str) {
        self.fields.remove(field);
    }

    /// All current field values
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Snapshot value of a field, if any
    pub fn snapshot_value(&self, field: &str) -> Option<&Value> {
        self.snapshot.get(field)
    }

    /// Capture the previous-state snapshot.
    ///
    /// An entity with no persisted identity snapshots empty, so that
    /// construction-time fields diff as "new" rather than "changed".
    pub fn capture_snapshot(&mut self) {
        if self.id.is_none() {
            self.snapshot.clear();
        } else {
            self.snapshot = self.fields.clone();
        }
    }

    /// Roll one field back to its snapshot value.
    ///
    /// Used when a save routes the field into a pending audit: the
    /// mutation is queued, not applied, so the in-memory value must not
    /// drift ahead of the row.
    pub fn revert_field(&mut self, field: &str) {
        match self.snapshot.get(field) {
            Some(previous) => {
                self.fields.insert(field.to_string(), previous.clone());
            }
            None => {
                self.fields.remove(field);
            }
        }
    }

    /// Assign the identity produced by a physical insert and recapture
    /// the snapshot against the now-persisted state.
    pub(crate) fn mark_persisted(&mut self, id: EntityId) {
        self.id = Some(id);
        self.capture_snapshot();
    }
}

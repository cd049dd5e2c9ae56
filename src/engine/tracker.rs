//! Change tracker
//!
//! Diffs an entity's current field values against its previous-state
//! snapshot, through the model's field descriptors: the untracked set
//! is excluded, equality is type-aware (timestamps compare at the
//! precision the serialized form keeps), and values are type-checked
//! while the diff is computed so a malformed value never reaches the
//! authorization gate.

use serde_json::Value;

use crate::model::{Entity, ModelDef, ModelError, IDENTITY_FIELD};

/// One changed field: previous and current values, either side optional
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Field name
    pub field: String,
    /// Snapshot value, absent when the field is newly set
    pub previous: Option<Value>,
    /// Current value, absent when the field was cleared
    pub current: Option<Value>,
}

/// Compute the tracked diff of an entity against its snapshot.
///
/// Fields set on the entity but not declared on the model are rejected;
/// a brand-new entity (empty snapshot) diffs every set field as new.
pub fn diff(model: &ModelDef, entity: &Entity) -> Result<Vec<FieldChange>, ModelError> {
    for field in entity.fields().keys() {
        if field != IDENTITY_FIELD && !model.fields.contains_key(field) {
            return Err(ModelError::UnknownField {
                model: model.name.clone(),
                field: field.clone(),
            });
        }
    }

    let mut changes = Vec::new();
    for (field, def) in &model.fields {
        if !model.is_tracked(field) {
            continue;
        }
        let previous = entity.snapshot_value(field).cloned();
        let current = entity.get(field).cloned();
        match (&previous, &current) {
            (None, None) => continue,
            (Some(prev), Some(cur)) if def.kind.values_equal(prev, cur) => continue,
            _ => {}
        }
        if let Some(cur) = &current {
            if !def.kind.accepts(cur) {
                return Err(ModelError::TypeMismatch {
                    model: model.name.clone(),
                    field: field.clone(),
                    expected: def.kind.kind_name(),
                    actual: cur.to_string(),
                });
            }
        }
        changes.push(FieldChange {
            field: field.clone(),
            previous,
            current,
        });
    }
    Ok(changes)
}

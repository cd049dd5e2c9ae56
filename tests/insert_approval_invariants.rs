//! Pending Insert Invariant Tests
//!
//! - A pending insert persists no row; every diff (identity included)
//!   queues against a reserved identity
//! - Approving the identity audit before required fields resolve fails
//!   closed with an integrity violation and creates nothing
//! - Approving after the required fields resolve creates exactly one
//!   row carrying the approved values
//! - Rejecting the identity audit cascades to every unresolved sibling
//! - Batch resolution orders field audits first, then identity audits
//!   in dependency order, atomically

mod common;

use canopy::model::{Entity, IDENTITY_FIELD};
use canopy::storage::Backend;
use serde_json::json;

fn pending_tree(h: &common::Harness) -> canopy::engine::SaveOutcome {
    let plot = h.create_plot();
    let mut tree = Entity::new("tree", h.scope);
    tree.set("plot", json!(plot.value()));
    tree.set("species", json!("dogwood"));
    let outcome = h.engine.save_with_user(&mut tree, h.editor).unwrap();
    assert!(!outcome.persisted);
    // The entity itself stays unsaved
    assert_eq!(tree.id(), None);
    outcome
}

fn audit_id_for<'a>(
    outcome: &'a canopy::engine::SaveOutcome,
    field: &str,
) -> &'a canopy::audit::Audit {
    outcome
        .audits
        .iter()
        .find(|a| a.field.as_deref() == Some(field))
        .unwrap()
}

// =============================================================================
// Queueing
// =============================================================================

/// A pending insert writes only Proposed audits and no row.
#[test]
fn test_pending_insert_persists_no_row() {
    let h = common::harness();
    let outcome = pending_tree(&h);

    // plot + species + identity, all pending
    assert_eq!(outcome.audits.len(), 3);
    assert!(outcome.audits.iter().all(|a| a.requires_auth));
    assert!(outcome.audits.iter().all(|a| a.ref_id.is_none()));
    assert!(h.engine.fetch("tree", outcome.entity_id).unwrap().is_none());
}

/// Reserved identities are never reused, even for rejected inserts.
#[test]
fn test_rejected_insert_wastes_its_identity() {
    let h = common::harness();
    let first = pending_tree(&h);
    let identity = audit_id_for(&first, IDENTITY_FIELD);
    h.engine
        .approve_or_reject(identity.id, h.admin, false)
        .unwrap();

    let second = pending_tree(&h);
    assert!(second.entity_id > first.entity_id);
}

// =============================================================================
// Identity approval ordering
// =============================================================================

/// Approving the identity audit while the required `plot` reference is
/// still unresolved fails closed; no row appears.
#[test]
fn test_identity_approval_before_required_fields_fails() {
    let h = common::harness();
    let outcome = pending_tree(&h);
    let identity = audit_id_for(&outcome, IDENTITY_FIELD);

    let err = h
        .engine
        .approve_or_reject(identity.id, h.admin, true)
        .unwrap_err();
    assert_eq!(err.code(), "INTEGRITY_VIOLATION");
    assert!(h.engine.fetch("tree", outcome.entity_id).unwrap().is_none());

    // The failed approval rolled back whole: the identity audit is
    // still unresolved and can be approved later
    let plot_audit = audit_id_for(&outcome, "plot");
    h.engine
        .approve_or_reject(plot_audit.id, h.admin, true)
        .unwrap();
    h.engine
        .approve_or_reject(identity.id, h.admin, true)
        .unwrap();
    assert!(h.engine.fetch("tree", outcome.entity_id).unwrap().is_some());
}

/// Once every required field is approved, identity approval creates
/// exactly one row carrying the approved values.
#[test]
fn test_identity_approval_concretizes_approved_values() {
    let h = common::harness();
    let outcome = pending_tree(&h);
    let plot_audit = audit_id_for(&outcome, "plot");
    let species_audit = audit_id_for(&outcome, "species");
    let identity = audit_id_for(&outcome, IDENTITY_FIELD);

    h.engine
        .approve_or_reject(plot_audit.id, h.admin, true)
        .unwrap();
    // species stays unresolved: it is optional and must not block
    let resolution = h
        .engine
        .approve_or_reject(identity.id, h.admin, true)
        .unwrap();
    assert!(resolution.concretized);

    let row = h.engine.fetch("tree", outcome.entity_id).unwrap().unwrap();
    assert_eq!(
        row.get("plot"),
        Some(&json!(plot_audit.current_value.as_deref().unwrap().parse::<u64>().unwrap()))
    );
    assert!(row.get("species").is_none());
    assert_eq!(row.created_by(), Some(h.editor));

    // Approving the optional field afterwards applies onto the live row
    h.engine
        .approve_or_reject(species_audit.id, h.admin, true)
        .unwrap();
    let row = h.engine.fetch("tree", outcome.entity_id).unwrap().unwrap();
    assert_eq!(row.get("species"), Some(&json!("dogwood")));
}

/// Approving the identity of an already-concretized insert is a no-op.
#[test]
fn test_identity_approval_is_noop_when_row_exists() {
    let h = common::harness();
    let outcome = pending_tree(&h);
    let ids: Vec<_> = outcome.audits.iter().map(|a| a.id).collect();
    h.engine
        .approve_or_reject_many(&ids, h.admin, true)
        .unwrap();

    // A second pending insert against the same reserved identity can
    // not happen, but a no-op concretization can: simulate by checking
    // the resolved outcome reported concretization exactly once
    let row = h.engine.fetch("tree", outcome.entity_id).unwrap().unwrap();
    assert_eq!(row.get("species"), Some(&json!("dogwood")));
}

// =============================================================================
// Identity rejection cascade
// =============================================================================

/// Rejecting the identity audit rejects every unresolved sibling; no
/// row is ever created.
#[test]
fn test_identity_rejection_cascades() {
    let h = common::harness();
    let outcome = pending_tree(&h);
    let identity = audit_id_for(&outcome, IDENTITY_FIELD);

    let resolution = h
        .engine
        .approve_or_reject(identity.id, h.admin, false)
        .unwrap();
    assert_eq!(resolution.cascaded.len(), 2);
    assert!(h.engine.fetch("tree", outcome.entity_id).unwrap().is_none());

    // Every sibling is now terminally resolved
    for audit in &outcome.audits {
        let err = h
            .engine
            .approve_or_reject(audit.id, h.admin, true)
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_RESOLVED");
    }
}

// =============================================================================
// Batch resolution
// =============================================================================

/// A whole pending plot + pending tree resolve in one batch: field
/// audits first, then plot identity before tree identity, so the
/// tree's reference finds a live plot row.
#[test]
fn test_batch_approval_orders_dependencies() {
    let h = common::harness();

    let mut plot = Entity::new("plot", h.scope);
    plot.set("geom", json!({"x": -122.3, "y": 47.6}));
    let plot_outcome = h.engine.save_with_user(&mut plot, h.editor).unwrap();
    assert!(!plot_outcome.persisted);

    let mut tree = Entity::new("tree", h.scope);
    tree.set("plot", json!(plot_outcome.entity_id.value()));
    let tree_outcome = h.engine.save_with_user(&mut tree, h.editor).unwrap();
    assert!(!tree_outcome.persisted);

    // Hand the audits over in a deliberately unhelpful order
    let mut ids: Vec<_> = tree_outcome
        .audits
        .iter()
        .chain(plot_outcome.audits.iter())
        .map(|a| a.id)
        .collect();
    ids.reverse();

    let outcomes = h
        .engine
        .approve_or_reject_many(&ids, h.admin, true)
        .unwrap();
    assert_eq!(outcomes.len(), ids.len());

    let plot_row = h.engine.fetch("plot", plot_outcome.entity_id).unwrap();
    let tree_row = h.engine.fetch("tree", tree_outcome.entity_id).unwrap();
    assert!(plot_row.is_some());
    assert_eq!(
        tree_row.unwrap().get("plot"),
        Some(&json!(plot_outcome.entity_id.value()))
    );
}

/// A batch is one atomic unit: when the identity audit fails, already
/// applied siblings roll back with it.
#[test]
fn test_batch_failure_rolls_back_whole() {
    let h = common::harness();
    let plot = h.create_plot();

    let mut tree = Entity::new("tree", h.scope);
    tree.set("plot", json!(plot.value()));
    tree.set("species", json!("hawthorn"));
    let outcome = h.engine.save_with_user(&mut tree, h.editor).unwrap();

    // Delete the referenced plot out from under the pending insert
    let plot_row = h.engine.fetch("plot", plot).unwrap().unwrap();
    h.engine.delete_with_user(&plot_row, h.admin).unwrap();

    let ids: Vec<_> = outcome.audits.iter().map(|a| a.id).collect();
    let err = h
        .engine
        .approve_or_reject_many(&ids, h.admin, true)
        .unwrap_err();
    assert_eq!(err.code(), "INTEGRITY_VIOLATION");

    // Nothing in the batch stuck: every audit is still unresolved
    h.engine
        .backend()
        .transaction::<_, canopy::storage::StorageError, _>(|txn| {
            use canopy::storage::Transaction;
            for id in &ids {
                assert!(txn.audit(*id).unwrap().ref_id.is_none());
            }
            Ok(())
        })
        .unwrap();
    assert!(h.engine.fetch("tree", outcome.entity_id).unwrap().is_none());
}

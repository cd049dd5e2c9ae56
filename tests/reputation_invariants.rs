//! Reputation Invariant Tests
//!
//! - Direct writes score immediately; pending edits score only at
//!   resolution
//! - Approval adds, denial subtracts with a floor at zero
//! - The floor holds for any sequence of denials, however large the
//!   configured denial score

mod common;

use canopy::audit::AuditAction;
use canopy::model::{ScopeId, UserId};
use canopy::reputation::{inventory_metrics, ReputationMetric, ReputationTable};
use canopy::storage::Backend;
use serde_json::json;

fn reputation_of(h: &common::Harness, user: UserId) -> u64 {
    h.engine
        .backend()
        .transaction::<_, canopy::storage::StorageError, _>(|txn| {
            use canopy::storage::Transaction;
            Ok(txn.user(user).map(|row| row.reputation).unwrap_or(0))
        })
        .unwrap()
}

// =============================================================================
// Scoring moments
// =============================================================================

/// A direct write scores at save time.
#[test]
fn test_direct_write_scores_at_save() {
    let h = common::harness_with_reputation(inventory_metrics(ScopeId::new(1)));
    let plot_id = h.create_plot();

    // create_plot wrote geom + width + identity audits; identity and
    // field audits all carry the insert action
    let after_insert = reputation_of(&h, h.admin);
    assert!(after_insert > 0);

    let mut plot = h.engine.fetch("plot", plot_id).unwrap().unwrap();
    plot.set("width", json!(10.0));
    h.engine.save_with_user(&mut plot, h.admin).unwrap();
    assert_eq!(reputation_of(&h, h.admin), after_insert + 5);
}

/// A pending edit scores nothing until it resolves; approval credits
/// the editor, not the moderator.
#[test]
fn test_pending_edit_scores_at_resolution() {
    let h = common::harness_with_reputation(inventory_metrics(ScopeId::new(1)));
    let plot_id = h.create_plot();
    let tree_id = h.create_tree(plot_id);
    let moderator_before = reputation_of(&h, h.admin);

    let mut tree = h.engine.fetch("tree", tree_id).unwrap().unwrap();
    tree.set("diameter", json!(3.9));
    let outcome = h.engine.save_with_user(&mut tree, h.editor).unwrap();
    assert_eq!(reputation_of(&h, h.editor), 0);

    h.engine
        .approve_or_reject(outcome.audits[0].id, h.admin, true)
        .unwrap();
    assert_eq!(reputation_of(&h, h.editor), 5);
    assert_eq!(reputation_of(&h, h.admin), moderator_before);
}

// =============================================================================
// The floor
// =============================================================================

/// Denials subtract but never push reputation below zero, regardless
/// of how large the denial score is.
#[test]
fn test_denial_floor_holds_for_any_sequence() {
    let mut table = ReputationTable::new();
    table.insert(ReputationMetric {
        scope: ScopeId::new(1),
        model: "tree".to_string(),
        action: AuditAction::Update,
        direct_write_score: 2,
        approval_score: 2,
        denial_score: 10_000,
    });
    let h = common::harness_with_reputation(table);
    let plot_id = h.create_plot();
    let tree_id = h.create_tree(plot_id);

    for diameter in [3.0, 3.5, 4.0] {
        let mut tree = h.engine.fetch("tree", tree_id).unwrap().unwrap();
        tree.set("diameter", json!(diameter));
        let outcome = h.engine.save_with_user(&mut tree, h.editor).unwrap();
        h.engine
            .approve_or_reject(outcome.audits[0].id, h.admin, false)
            .unwrap();
        assert_eq!(reputation_of(&h, h.editor), 0);
    }
}

/// Approvals and denials interleave; the score never dips below zero
/// in between.
#[test]
fn test_interleaved_resolutions_stay_at_or_above_zero() {
    let h = common::harness_with_reputation(inventory_metrics(ScopeId::new(1)));
    let plot_id = h.create_plot();
    let tree_id = h.create_tree(plot_id);

    for (diameter, approve) in [(3.0, true), (3.2, false), (3.4, false), (3.6, true)] {
        let mut tree = h.engine.fetch("tree", tree_id).unwrap().unwrap();
        tree.set("diameter", json!(diameter));
        let outcome = h.engine.save_with_user(&mut tree, h.editor).unwrap();
        h.engine
            .approve_or_reject(outcome.audits[0].id, h.admin, approve)
            .unwrap();
    }
    // +5, -5 (to 0), -5 (floored), +5
    assert_eq!(reputation_of(&h, h.editor), 5);
}

/// An unconfigured (scope, model, action) has no reputation effect.
#[test]
fn test_unconfigured_metric_scores_nothing() {
    let h = common::harness(); // empty table
    let plot_id = h.create_plot();
    let tree_id = h.create_tree(plot_id);

    let mut tree = h.engine.fetch("tree", tree_id).unwrap().unwrap();
    tree.set("diameter", json!(3.9));
    let outcome = h.engine.save_with_user(&mut tree, h.editor).unwrap();
    h.engine
        .approve_or_reject(outcome.audits[0].id, h.admin, true)
        .unwrap();

    assert_eq!(reputation_of(&h, h.admin), 0);
    assert_eq!(reputation_of(&h, h.editor), 0);
}

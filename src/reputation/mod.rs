//! Reputation subsystem
//!
//! Scores user contributions from the audit stream. A deployment
//! configures one `ReputationMetric` per (scope, model, action); an
//! audit with no matching metric has no reputation effect.
//!
//! # Invariants
//!
//! - An unresolved pending edit scores nothing; the score lands at
//!   resolution time.
//! - Denials subtract with a floor at zero; reputation is never
//!   negative.
//! - Within one batch, all deltas for a user accumulate against a
//!   single in-memory score before one persist.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::audit::{Audit, AuditAction};
use crate::model::{ScopeId, UserId};
use crate::storage::{Transaction, UserRow};

/// Scoring row for (scope, model, action)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationMetric {
    /// Scope the metric applies in
    pub scope: ScopeId,
    /// Model the metric applies to
    pub model: String,
    /// Change action the metric scores (insert, update, delete)
    pub action: AuditAction,
    /// Awarded immediately for a direct write
    pub direct_write_score: u64,
    /// Awarded when a pending edit is approved
    pub approval_score: u64,
    /// Subtracted (floored at zero) when a pending edit is denied
    pub denial_score: u64,
}

/// Configured scoring table
#[derive(Debug, Clone, Default)]
pub struct ReputationTable {
    metrics: BTreeMap<(ScopeId, String, u8), ReputationMetric>,
}

impl ReputationTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metric, replacing any previous one for the same key
    pub fn insert(&mut self, metric: ReputationMetric) {
        self.metrics.insert(
            (metric.scope, metric.model.clone(), metric.action.code()),
            metric,
        );
    }

    /// Look up the metric for (scope, model, action)
    pub fn lookup(
        &self,
        scope: ScopeId,
        model: &str,
        action: AuditAction,
    ) -> Option<&ReputationMetric> {
        self.metrics
            .get(&(scope, model.to_string(), action.code()))
    }

    /// Apply the effect of freshly created audits.
    ///
    /// Direct writes score immediately; pending edits score nothing
    /// until resolved. Deltas are accumulated per user and persisted
    /// once per user.
    pub fn apply_created(&self, txn: &mut dyn Transaction, audits: &[Audit]) {
        let mut deltas: BTreeMap<UserId, u64> = BTreeMap::new();
        for audit in audits {
            if audit.requires_auth {
                continue;
            }
            if let Some(metric) = self.lookup(audit.scope, &audit.model, audit.action) {
                *deltas.entry(audit.user).or_insert(0) += metric.direct_write_score;
            }
        }
        for (user, delta) in deltas {
            if delta == 0 {
                continue;
            }
            let mut row = txn.user(user).unwrap_or(UserRow {
                id: user,
                reputation: 0,
            });
            row.reputation += delta;
            txn.upsert_user(row);
        }
    }

    /// Apply the effect of resolving one audit.
    ///
    /// The metric is keyed by the original audit's change action; the
    /// score goes to the user who made the edit, not the moderator.
    pub fn apply_resolved(&self, txn: &mut dyn Transaction, audit: &Audit, approved: bool) {
        let metric = match self.lookup(audit.scope, &audit.model, audit.action) {
            Some(metric) => metric,
            None => return,
        };
        let mut row = txn.user(audit.user).unwrap_or(UserRow {
            id: audit.user,
            reputation: 0,
        });
        if approved {
            row.reputation += metric.approval_score;
        } else {
            row.reputation = row.reputation.saturating_sub(metric.denial_score);
        }
        txn.upsert_user(row);
    }
}

/// Conventional scoring for the inventory domain: small rewards for
/// direct writes and approvals, a matching penalty for denials.
pub fn inventory_metrics(scope: ScopeId) -> ReputationTable {
    let mut table = ReputationTable::new();
    for model in ["plot", "tree"] {
        for action in [AuditAction::Insert, AuditAction::Update, AuditAction::Delete] {
            table.insert(ReputationMetric {
                scope,
                model: model.to_string(),
                action,
                direct_write_score: 5,
                approval_score: 5,
                denial_score: 5,
            });
        }
    }
    table
}

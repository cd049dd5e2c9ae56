//! Audit action types
//!
//! Integer codes are stable for persisted rows; unknown codes are
//! rejected at decode time, never mapped to a default.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Action recorded by one audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum AuditAction {
    /// A field (or the identity) written by an insert
    Insert,
    /// A row deleted
    Delete,
    /// A field written by an update
    Update,
    /// Resolution marker: a pending edit was approved
    PendingApprove,
    /// Resolution marker: a pending edit was rejected
    PendingReject,
    /// Resolution marker: an already-applied edit was reviewed and kept
    ReviewApprove,
    /// Resolution marker: an already-applied edit was reviewed and
    /// reverted
    ReviewReject,
}

impl AuditAction {
    /// Stable integer code for persisted rows
    pub fn code(self) -> u8 {
        match self {
            AuditAction::Insert => 0,
            AuditAction::Delete => 1,
            AuditAction::Update => 2,
            AuditAction::PendingApprove => 3,
            AuditAction::PendingReject => 4,
            AuditAction::ReviewApprove => 5,
            AuditAction::ReviewReject => 6,
        }
    }

    /// Convert from a persisted code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(AuditAction::Insert),
            1 => Some(AuditAction::Delete),
            2 => Some(AuditAction::Update),
            3 => Some(AuditAction::PendingApprove),
            4 => Some(AuditAction::PendingReject),
            5 => Some(AuditAction::ReviewApprove),
            6 => Some(AuditAction::ReviewReject),
            _ => None,
        }
    }

    /// Returns the action name string
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Insert => "INSERT",
            AuditAction::Delete => "DELETE",
            AuditAction::Update => "UPDATE",
            AuditAction::PendingApprove => "PENDING_APPROVE",
            AuditAction::PendingReject => "PENDING_REJECT",
            AuditAction::ReviewApprove => "REVIEW_APPROVE",
            AuditAction::ReviewReject => "REVIEW_REJECT",
        }
    }

    /// Human-readable form for the presentation layer
    pub fn display(self) -> &'static str {
        match self {
            AuditAction::Insert => "created",
            AuditAction::Delete => "deleted",
            AuditAction::Update => "updated",
            AuditAction::PendingApprove => "approved a pending edit of",
            AuditAction::PendingReject => "rejected a pending edit of",
            AuditAction::ReviewApprove => "reviewed and kept an edit of",
            AuditAction::ReviewReject => "reviewed and reverted an edit of",
        }
    }

    /// Whether the action carries a value change (as opposed to marking
    /// a resolution)
    pub fn is_change(self) -> bool {
        matches!(
            self,
            AuditAction::Insert | AuditAction::Delete | AuditAction::Update
        )
    }

    /// Whether the action is a resolution marker
    pub fn is_resolution(self) -> bool {
        !self.is_change()
    }

    /// Whether the action marks an approval
    pub fn is_approval(self) -> bool {
        matches!(self, AuditAction::PendingApprove | AuditAction::ReviewApprove)
    }
}

impl From<AuditAction> for u8 {
    fn from(action: AuditAction) -> u8 {
        action.code()
    }
}

impl TryFrom<u8> for AuditAction {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        AuditAction::from_code(code).ok_or_else(|| format!("unknown audit action code {}", code))
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

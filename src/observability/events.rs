//! Engine events
//!
//! Every observable engine transition has a typed event. Events are
//! emitted after the transaction that produced them commits; nothing is
//! logged for rolled-back work.

use std::fmt;

/// Observable engine transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// A save applied one or more direct field writes
    SaveApplied,
    /// A save queued one or more pending edits on an existing row
    EditQueued,
    /// A save queued a whole pending insert; no row exists yet
    InsertQueued,
    /// A pending edit was approved and applied
    AuditApproved,
    /// A pending edit was rejected
    AuditRejected,
    /// An identity approval concretized a pending insert into a row
    InsertConcretized,
    /// A reviewed direct edit was reverted
    EditReverted,
    /// A row was deleted
    EntityDeleted,
    /// A batch of audits was resolved atomically
    BatchResolved,
    /// An audit could not be mirrored to the durable journal
    JournalAppendFailed,
}

impl EngineEvent {
    /// Returns the event name string
    pub fn as_str(self) -> &'static str {
        match self {
            EngineEvent::SaveApplied => "SAVE_APPLIED",
            EngineEvent::EditQueued => "EDIT_QUEUED",
            EngineEvent::InsertQueued => "INSERT_QUEUED",
            EngineEvent::AuditApproved => "AUDIT_APPROVED",
            EngineEvent::AuditRejected => "AUDIT_REJECTED",
            EngineEvent::InsertConcretized => "INSERT_CONCRETIZED",
            EngineEvent::EditReverted => "EDIT_REVERTED",
            EngineEvent::EntityDeleted => "ENTITY_DELETED",
            EngineEvent::BatchResolved => "BATCH_RESOLVED",
            EngineEvent::JournalAppendFailed => "JOURNAL_APPEND_FAILED",
        }
    }

    /// Whether the event reports a failure
    pub fn is_failure(self) -> bool {
        matches!(self, EngineEvent::JournalAppendFailed)
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

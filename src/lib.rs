//! canopy - field-level audit, permission, and moderation engine
//!
//! A library engine for collaborative map inventories: every mutation to
//! a domain entity is diffed field by field, checked against role-scoped
//! permissions, and either applied with an audit trail, queued as a
//! pending edit awaiting moderation, or rejected whole. Moderators
//! resolve pending edits transactionally, including cascaded approval of
//! multi-field pending inserts, and every audit feeds a configurable
//! reputation ledger.
//!
//! The engine has no wire surface of its own; the embedding layer calls
//! `AuditEngine::save_with_user`, `delete_with_user`,
//! `approve_or_reject`, `review_existing_edit`, and
//! `approve_or_reject_many`.

pub mod audit;
pub mod engine;
pub mod model;
pub mod observability;
pub mod permission;
pub mod reputation;
pub mod storage;

pub use audit::{Audit, AuditAction};
pub use engine::{AuditEngine, EngineError, EngineResult, ResolveOutcome, SaveOutcome};
pub use model::{Entity, ModelRegistry};
pub use permission::{PermissionLevel, PermissionService};
pub use storage::MemoryBackend;

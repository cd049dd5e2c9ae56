//! Permission subsystem
//!
//! Role-scoped, per-model, per-field grants on the four-step level
//! ladder, resolved through an explicitly invalidated process-wide
//! cache.
//!
//! # Invariants
//!
//! - Levels are monotonic: `WRITE_DIRECTLY` implies writes and reads,
//!   `READ_ONLY` implies reads only.
//! - A field with no grant is `NONE` unless it is in the model's bypass
//!   set, which is always readable and writable.
//! - Grant targets are validated when the grant is saved, not when it is
//!   consulted.
//! - Cache correctness depends entirely on invalidation on write; there
//!   is no TTL.

mod cache;
mod errors;
mod grant;
mod level;
mod role;
mod service;

pub use cache::{EffectivePermissions, PermissionCache};
pub use errors::{PermissionError, PermissionResult};
pub use grant::FieldGrant;
pub use level::PermissionLevel;
pub use role::{
    standard_roles, CreateCapability, Role, ROLE_ADMINISTRATOR, ROLE_EDITOR, ROLE_PUBLIC,
};
pub use service::PermissionService;

//! Identity newtypes
//!
//! Every persisted row is addressed by an opaque numeric identity. These
//! are pure types with no behavior beyond construction and access; the
//! values are allocated by the storage layer's sequences and are never
//! reused, even when a reservation is ultimately discarded.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! identity_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw identity value.
            #[inline]
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the underlying value.
            ///
            /// Exists for serialization and display only; callers should
            /// not depend on the internal representation.
            #[inline]
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

identity_type! {
    /// Identity of a domain entity row (a plot, a tree).
    ///
    /// An `EntityId` may be *reserved* before any row exists: pending
    /// inserts allocate their identity up front so that the queued field
    /// audits have a stable key to share.
    EntityId
}

identity_type! {
    /// Identity of a single audit record.
    ///
    /// Allocation order matches recency: a larger id is a later audit.
    AuditId
}

identity_type! {
    /// Identity of an acting user.
    UserId
}

identity_type! {
    /// Identity of a role.
    RoleId
}

identity_type! {
    /// Identity of a scope (tenant / map instance).
    ///
    /// Roles, grants, audits, and reputation metrics are all partitioned
    /// by scope.
    ScopeId
}

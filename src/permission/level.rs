//! Permission levels
//!
//! The four-step ladder applied per (model, field, role, scope). Levels
//! are monotonic: a level that allows writes also allows reads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Field-level permission ladder
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum PermissionLevel {
    /// No access
    None = 0,
    /// Read access only
    ReadOnly = 1,
    /// Writes are queued as pending edits awaiting moderation
    WriteWithAudit = 2,
    /// Writes apply immediately
    WriteDirectly = 3,
}

impl PermissionLevel {
    /// Stable integer code for persisted rows
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Convert from a persisted code; unknown codes are rejected
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PermissionLevel::None),
            1 => Some(PermissionLevel::ReadOnly),
            2 => Some(PermissionLevel::WriteWithAudit),
            3 => Some(PermissionLevel::WriteDirectly),
            _ => None,
        }
    }

    /// Whether the level grants read access
    pub fn allows_reads(self) -> bool {
        self >= PermissionLevel::ReadOnly
    }

    /// Whether the level grants write access (audited or direct)
    pub fn allows_writes(self) -> bool {
        self >= PermissionLevel::WriteWithAudit
    }

    /// Returns the level name string
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionLevel::None => "NONE",
            PermissionLevel::ReadOnly => "READ_ONLY",
            PermissionLevel::WriteWithAudit => "WRITE_WITH_AUDIT",
            PermissionLevel::WriteDirectly => "WRITE_DIRECTLY",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

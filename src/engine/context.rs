//! Operation context
//!
//! Correlation metadata carried by one engine operation, used for log
//! lines only. The context never influences an outcome.

use std::time::Instant;

use uuid::Uuid;

use crate::model::UserId;

/// Correlation context for one engine operation
#[derive(Debug, Clone)]
pub struct OpContext {
    /// Operation id for log correlation
    pub op_id: Uuid,
    /// Acting user
    pub user: UserId,
    started_at: Instant,
}

impl OpContext {
    /// Start a context for an operation by the given user
    pub fn new(user: UserId) -> Self {
        Self {
            op_id: Uuid::new_v4(),
            user,
            started_at: Instant::now(),
        }
    }

    /// Elapsed time since the operation started, in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }
}

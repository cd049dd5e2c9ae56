//! Audit records
//!
//! One audit is one field change, insert, delete, or moderation
//! decision. Records are append-only: once written, the only permitted
//! mutation is setting the resolution pointer `ref_id`, exactly once.
//!
//! State of a pending edit is carried by two flags:
//! - `requires_auth && ref_id.is_none()` — proposed, awaiting moderation
//! - `requires_auth && ref_id.is_some()` — resolved; the referenced
//!   marker audit says whether it was approved or rejected

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AuditId, EntityId, ModelDef, ScopeId, UserId, IDENTITY_FIELD};

use super::action::AuditAction;
use super::render::{title_case, ValueRenderer};

/// One append-only audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    /// Record identity; allocation order matches recency
    pub id: AuditId,
    /// Model of the entity the audit concerns
    pub model: String,
    /// Identity of that entity (possibly reserved, for pending inserts)
    pub model_id: EntityId,
    /// Scope partition
    pub scope: ScopeId,
    /// Field name; `None` for delete markers
    pub field: Option<String>,
    /// Serialized previous value, if any
    pub previous_value: Option<String>,
    /// Serialized current value, if any
    pub current_value: Option<String>,
    /// Acting user
    pub user: UserId,
    /// Action recorded
    pub action: AuditAction,
    /// Whether the change was routed through moderation
    pub requires_auth: bool,
    /// Resolution pointer; set exactly once when the audit is resolved
    pub ref_id: Option<AuditId>,
    /// Creation timestamp
    pub created: DateTime<Utc>,
}

impl Audit {
    /// Create an audit row
    pub fn new(
        id: AuditId,
        model: impl Into<String>,
        model_id: EntityId,
        scope: ScopeId,
        user: UserId,
        action: AuditAction,
    ) -> Self {
        Self {
            id,
            model: model.into(),
            model_id,
            scope,
            field: None,
            previous_value: None,
            current_value: None,
            user,
            action,
            requires_auth: false,
            ref_id: None,
            created: Utc::now(),
        }
    }

    /// Set the field name
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Set the serialized previous/current values
    pub fn with_values(mut self, previous: Option<String>, current: Option<String>) -> Self {
        self.previous_value = previous;
        self.current_value = current;
        self
    }

    /// Mark the audit as a pending edit awaiting moderation
    pub fn pending(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Whether this is an unresolved pending edit
    pub fn is_pending(&self) -> bool {
        self.requires_auth && self.ref_id.is_none()
    }

    /// Whether this audit has been resolved
    pub fn is_resolved(&self) -> bool {
        self.ref_id.is_some()
    }

    /// Whether this is the synthetic identity audit of an insert
    pub fn is_identity(&self) -> bool {
        self.action == AuditAction::Insert && self.field.as_deref() == Some(IDENTITY_FIELD)
    }

    // ==================
    // Presentation hooks
    // ==================

    /// Human-readable action
    pub fn display_action(&self) -> &'static str {
        self.action.display()
    }

    /// Presentation name of the audited field
    pub fn field_display_name(&self, model: &ModelDef) -> String {
        let field = match self.field.as_deref() {
            Some(field) => field,
            None => return title_case(&self.model),
        };
        model
            .fields
            .get(field)
            .and_then(|def| def.display_name.clone())
            .unwrap_or_else(|| title_case(field))
    }

    /// Rendered previous value
    pub fn previous_display_value(
        &self,
        model: &ModelDef,
        renderer: &dyn ValueRenderer,
    ) -> Option<String> {
        self.render_value(self.previous_value.as_deref(), model, renderer)
    }

    /// Rendered current value
    pub fn current_display_value(
        &self,
        model: &ModelDef,
        renderer: &dyn ValueRenderer,
    ) -> Option<String> {
        self.render_value(self.current_value.as_deref(), model, renderer)
    }

    fn render_value(
        &self,
        raw: Option<&str>,
        model: &ModelDef,
        renderer: &dyn ValueRenderer,
    ) -> Option<String> {
        let raw = raw?;
        let field = self.field.as_deref()?;
        Some(renderer.render(model, field, raw))
    }
}

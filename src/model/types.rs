//! Field and model definitions
//!
//! Every auditable entity type is described once, at startup, by a
//! `ModelDef`: an ordered map of `FieldDef`s plus the sets that control
//! tracking and permission bypass. All diff, apply, serialize, and
//! render operations go through these descriptors; there is no
//! reflection and no runtime accumulation of configuration.
//!
//! Supported field kinds:
//! - text: UTF-8 string
//! - int: 64-bit signed integer
//! - float: 64-bit floating point
//! - bool: boolean
//! - timestamp: RFC3339 instant, compared at whole-second precision
//! - point: planar coordinate pair with an SRID
//! - reference: foreign key to another registered model

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ModelError;

/// Name of the synthetic identity field.
///
/// The identity is not declared in `ModelDef::fields`; it is implicitly
/// untracked and permission-bypassed, and appears in audits only as the
/// field of an insert's identity audit.
pub const IDENTITY_FIELD: &str = "id";

/// Supported field kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldKind {
    /// UTF-8 string
    Text,
    /// 64-bit signed integer
    Int,
    /// 64-bit floating point
    Float,
    /// Boolean
    Bool,
    /// RFC3339 instant; equality holds at whole-second precision
    Timestamp,
    /// Planar coordinate pair `{ "x": f64, "y": f64 }`
    Point {
        /// Spatial reference identifier the coordinates are expressed in
        srid: u32,
    },
    /// Foreign key to another registered model
    Reference {
        /// Target model name
        model: String,
    },
}

impl FieldKind {
    /// Returns the kind name for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Point { .. } => "point",
            FieldKind::Reference { .. } => "reference",
        }
    }

    /// Checks that an in-memory value is acceptable for this kind.
    ///
    /// `Null` is never acceptable here; nullability is decided by
    /// `FieldDef::required` and absence is expressed by omitting the
    /// field entirely.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Text => value.is_string(),
            FieldKind::Int => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Timestamp => value
                .as_str()
                .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false),
            FieldKind::Point { .. } => match value.as_object() {
                Some(obj) => {
                    obj.len() == 2
                        && obj.get("x").map(|v| v.is_number()).unwrap_or(false)
                        && obj.get("y").map(|v| v.is_number()).unwrap_or(false)
                }
                None => false,
            },
            FieldKind::Reference { .. } => value.is_u64(),
        }
    }

    /// Type-aware equality between two values of this kind.
    ///
    /// Timestamps compare at the precision the serialized form keeps
    /// (whole seconds); everything else compares structurally.
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match self {
            FieldKind::Timestamp => {
                match (parse_timestamp(a), parse_timestamp(b)) {
                    (Some(ta), Some(tb)) => ta.timestamp() == tb.timestamp(),
                    _ => a == b,
                }
            }
            _ => a == b,
        }
    }

    /// Serializes a value of this kind to the opaque audit text form.
    ///
    /// The form is chosen so that `decode` round-trips through the same
    /// kind: plain text for strings and timestamps, canonical JSON for
    /// everything else.
    pub fn encode(&self, value: &Value) -> String {
        match self {
            FieldKind::Text => value.as_str().map(str::to_owned).unwrap_or_else(|| value.to_string()),
            FieldKind::Timestamp => match parse_timestamp(value) {
                Some(ts) => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
                None => value.to_string(),
            },
            _ => value.to_string(),
        }
    }

    /// Decodes audit text back into an in-memory value of this kind.
    pub fn decode(&self, model: &str, field: &str, raw: &str) -> Result<Value, ModelError> {
        let decode_failed = || ModelError::DecodeFailed {
            model: model.to_string(),
            field: field.to_string(),
            raw: raw.to_string(),
            expected: self.kind_name(),
        };
        match self {
            FieldKind::Text => Ok(Value::String(raw.to_string())),
            FieldKind::Int => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| decode_failed()),
            FieldKind::Float => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(decode_failed),
            FieldKind::Bool => raw
                .parse::<bool>()
                .map(Value::from)
                .map_err(|_| decode_failed()),
            FieldKind::Timestamp => {
                DateTime::parse_from_rfc3339(raw).map_err(|_| decode_failed())?;
                Ok(Value::String(raw.to_string()))
            }
            FieldKind::Point { .. } => {
                let value: Value = serde_json::from_str(raw).map_err(|_| decode_failed())?;
                if self.accepts(&value) {
                    Ok(value)
                } else {
                    Err(decode_failed())
                }
            }
            FieldKind::Reference { .. } => raw
                .parse::<u64>()
                .map(Value::from)
                .map_err(|_| decode_failed()),
        }
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<chrono::FixedOffset>> {
    value.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// A single field declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field data kind
    pub kind: FieldKind,
    /// Whether the field must be present and non-null on a persisted row
    pub required: bool,
    /// Presentation name; defaults to a title-cased form of the field name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Unit label handed to the value renderer (e.g. "in", "ft")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl FieldDef {
    /// Create a required field of the given kind
    pub fn required(kind: FieldKind) -> Self {
        Self {
            kind,
            required: true,
            display_name: None,
            unit: None,
        }
    }

    /// Create an optional field of the given kind
    pub fn optional(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            display_name: None,
            unit: None,
        }
    }

    /// Set the presentation name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the unit label
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Complete definition of one auditable model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    /// Unique model name
    pub name: String,
    /// Field declarations, ordered by name
    pub fields: BTreeMap<String, FieldDef>,
    /// Fields excluded from change tracking, declared once.
    ///
    /// The identity field is always a member.
    pub untracked: BTreeSet<String>,
    /// Fields exempt from permission checks: always readable and writable.
    ///
    /// The identity field is always a member.
    pub bypass: BTreeSet<String>,
    /// Whether the creating user may always delete their own rows,
    /// regardless of role
    pub creator_override: bool,
}

impl ModelDef {
    /// Create a model definition with the identity field pre-seeded into
    /// the untracked and bypass sets.
    pub fn new(name: impl Into<String>) -> Self {
        let mut untracked = BTreeSet::new();
        untracked.insert(IDENTITY_FIELD.to_string());
        let mut bypass = BTreeSet::new();
        bypass.insert(IDENTITY_FIELD.to_string());
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            untracked,
            bypass,
            creator_override: false,
        }
    }

    /// Declare a field
    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    /// Exclude a field from change tracking
    pub fn untracked_field(mut self, name: impl Into<String>) -> Self {
        self.untracked.insert(name.into());
        self
    }

    /// Exempt a field from permission checks
    pub fn bypass_field(mut self, name: impl Into<String>) -> Self {
        self.bypass.insert(name.into());
        self
    }

    /// Enable the creator delete override
    pub fn with_creator_override(mut self) -> Self {
        self.creator_override = true;
        self
    }

    /// Look up a declared field
    pub fn field_def(&self, field: &str) -> Result<&FieldDef, ModelError> {
        self.fields.get(field).ok_or_else(|| ModelError::UnknownField {
            model: self.name.clone(),
            field: field.to_string(),
        })
    }

    /// Whether a field participates in change tracking
    pub fn is_tracked(&self, field: &str) -> bool {
        !self.untracked.contains(field)
    }

    /// Names of required fields, in declaration order
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, def)| def.required)
            .map(|(name, _)| name.as_str())
    }

    /// Validates the definition itself at registration time.
    ///
    /// The identity field must not be redeclared, every untracked or
    /// bypass member (other than the identity) must name a declared
    /// field, and reference kinds must not point at the model itself.
    pub fn validate_structure(&self) -> Result<(), ModelError> {
        let malformed = |reason: String| ModelError::MalformedModel {
            model: self.name.clone(),
            reason,
        };

        if self.name.is_empty() {
            return Err(malformed("model name must be non-empty".into()));
        }
        if self.fields.contains_key(IDENTITY_FIELD) {
            return Err(malformed(format!(
                "'{}' is implicit and must not be declared",
                IDENTITY_FIELD
            )));
        }
        for set in [&self.untracked, &self.bypass] {
            for member in set {
                if member != IDENTITY_FIELD && !self.fields.contains_key(member) {
                    return Err(malformed(format!("'{}' names no declared field", member)));
                }
            }
        }
        for (field, def) in &self.fields {
            if let FieldKind::Reference { model } = &def.kind {
                if model == &self.name {
                    return Err(malformed(format!(
                        "field '{}' must not reference its own model",
                        field
                    )));
                }
            }
        }
        Ok(())
    }
}

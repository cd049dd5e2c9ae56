//! # Model Errors
//!
//! Error types for the model registry and field-value handling.

use thiserror::Error;

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Model registry and field-value errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Model name is not present in the registry.
    ///
    /// Raised at registry lookup; unknown names are rejected when the
    /// registry is consulted, never deferred to first field access.
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    /// A model with this name is already registered
    #[error("model '{0}' is already registered")]
    DuplicateModel(String),

    /// Field name is not declared on the model
    #[error("model '{model}' has no field '{field}'")]
    UnknownField { model: String, field: String },

    /// A field value does not match the declared kind
    #[error("field '{model}.{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        model: String,
        field: String,
        expected: &'static str,
        actual: String,
    },

    /// A required field is missing or null
    #[error("field '{model}.{field}' is required and must be non-null")]
    MissingRequired { model: String, field: String },

    /// Serialized text could not be decoded back into a field value
    #[error("field '{model}.{field}': cannot decode '{raw}' as {expected}")]
    DecodeFailed {
        model: String,
        field: String,
        raw: String,
        expected: &'static str,
    },

    /// A model definition failed structural validation at registration
    #[error("model '{model}' is malformed: {reason}")]
    MalformedModel { model: String, reason: String },
}

impl ModelError {
    /// Stable error code for the embedding layer
    pub fn code(&self) -> &'static str {
        match self {
            ModelError::UnknownModel(_) => "UNKNOWN_MODEL",
            ModelError::DuplicateModel(_) => "DUPLICATE_MODEL",
            ModelError::UnknownField { .. } => "UNKNOWN_FIELD",
            ModelError::TypeMismatch { .. } => "TYPE_MISMATCH",
            ModelError::MissingRequired { .. } => "MISSING_REQUIRED",
            ModelError::DecodeFailed { .. } => "DECODE_FAILED",
            ModelError::MalformedModel { .. } => "MALFORMED_MODEL",
        }
    }
}

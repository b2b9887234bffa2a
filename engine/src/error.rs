//! Error types for the auto-patch engine.

use crate::{FieldPath, RecordState, Seq};
use thiserror::Error;

/// All possible errors from the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("unknown field: {0}")]
    UnknownField(FieldPath),

    #[error("missing required field: {0}")]
    MissingRequiredField(FieldPath),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: FieldPath,
        expected: String,
        got: String,
    },

    #[error("constraint violated for field '{field}': {reason}")]
    ConstraintViolation { field: FieldPath, reason: String },

    // Activity log errors
    #[error("invalid transition for record {seq}: {from} -> {to}")]
    InvalidTransition {
        seq: Seq,
        from: RecordState,
        to: RecordState,
    },

    #[error("record not found: {0}")]
    RecordNotFound(Seq),

    // Document and state errors
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
}

impl Error {
    /// The field path a validation error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::UnknownField(path) | Error::MissingRequiredField(path) => Some(path),
            Error::TypeMismatch { field, .. } | Error::ConstraintViolation { field, .. } => {
                Some(field)
            }
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Engine errors

use miette::Diagnostic;
use thiserror::Error;

use crate::core::entity::RecordKind;
use crate::store::StoreError;

/// Errors surfaced by resolution and mutation operations
///
/// Every variant is raised before any state change, so a failed call
/// leaves the session untouched.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    #[diagnostic(code(olt::not_found))]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid request: {message}")]
    #[diagnostic(code(olt::validation))]
    Validation { message: String },

    #[error("This operation needs a specific division, not ALL")]
    #[diagnostic(
        code(olt::scope_required),
        help("Pass --division <DIVISION> or set default_division in .olt/config.yaml")
    )]
    ScopeRequired,

    #[error("Position {index} is out of range for a workflow of {len} stage(s)")]
    #[diagnostic(code(olt::out_of_range))]
    OutOfRange { index: i64, len: usize },

    #[error("Save incomplete: failed to save {}", format_kinds(.failed))]
    #[diagnostic(
        code(olt::partial_save),
        help("Collections that saved are persisted; rerun the save to retry only the failed ones")
    )]
    PartialSave { failed: Vec<RecordKind> },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
        }
    }
}

fn format_kinds(kinds: &[RecordKind]) -> String {
    kinds
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

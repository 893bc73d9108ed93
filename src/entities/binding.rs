//! Requirement binding - a credential requirement attached to a logical stage

use serde::{Deserialize, Serialize};

use crate::core::entity::{Record, RecordKind};
use crate::store::normalize::{flex_bool, flex_opt_string, flex_string};

/// A requirement binding (cert type)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementBinding {
    /// Unique identifier; credentials reference this
    #[serde(default, deserialize_with = "flex_string")]
    pub id: String,

    /// Credential name (e.g. "CPR")
    #[serde(default, deserialize_with = "flex_string")]
    pub credential: String,

    #[serde(
        default,
        deserialize_with = "flex_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    /// Division the binding applies to
    #[serde(default, deserialize_with = "flex_string")]
    pub division: String,

    /// Logical stage the credential is required at; `None` when unbound
    #[serde(default, deserialize_with = "flex_opt_string")]
    pub logical_stage_id: Option<String>,

    /// Soft-delete flag
    #[serde(default, deserialize_with = "flex_bool")]
    pub deleted: bool,
}

impl RequirementBinding {
    pub fn new(
        credential: impl Into<String>,
        division: impl Into<String>,
        logical_stage_id: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            credential: credential.into(),
            description: None,
            division: division.into(),
            logical_stage_id: Some(logical_stage_id.into()),
            deleted: false,
        }
    }

    /// Whether this binding currently points at a logical stage
    pub fn is_bound(&self) -> bool {
        self.logical_stage_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Whether this binding is a live requirement for the given logical stage
    pub fn requires_at(&self, logical_stage_id: &str) -> bool {
        !self.deleted && self.logical_stage_id.as_deref() == Some(logical_stage_id)
    }

    /// Detach from its logical stage, keeping the record for reuse
    pub fn unbind(&mut self) {
        self.logical_stage_id = None;
    }
}

impl Record for RequirementBinding {
    const KIND: RecordKind = RecordKind::Bindings;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn division(&self) -> Option<&str> {
        Some(&self.division)
    }
}

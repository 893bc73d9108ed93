//! Subject - an individual moving through a division's workflow

use serde::{Deserialize, Serialize};

use crate::core::entity::{Record, RecordKind};
use crate::entities::credential::Credential;
use crate::store::normalize::{flex_opt_string, flex_string};

/// A subject (operator)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default, deserialize_with = "flex_string")]
    pub id: String,

    #[serde(default, deserialize_with = "flex_string")]
    pub first_name: String,

    #[serde(default, deserialize_with = "flex_string")]
    pub last_name: String,

    /// Division membership
    #[serde(default, deserialize_with = "flex_string")]
    pub division: String,

    /// Name of the current stage
    #[serde(default, deserialize_with = "flex_string")]
    pub stage_name: String,

    /// Stage record id of the current stage, when known
    #[serde(
        default,
        deserialize_with = "flex_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub stage_id: Option<String>,

    /// Order index of the current stage at the time it was set
    #[serde(
        default,
        deserialize_with = "flex_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub order: Option<String>,

    /// Credentials embedded with the subject record
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<Credential>,
}

impl Subject {
    pub fn new(
        id: impl Into<String>,
        division: impl Into<String>,
        stage_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            division: division.into(),
            stage_name: stage_name.into(),
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.id.clone()
        } else {
            full.to_string()
        }
    }

    /// Whether the subject's current stage name matches (case-insensitive)
    pub fn is_at_stage(&self, name: &str) -> bool {
        !self.stage_name.trim().is_empty() && self.stage_name.trim().eq_ignore_ascii_case(name.trim())
    }
}

impl Record for Subject {
    const KIND: RecordKind = RecordKind::Subjects;

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

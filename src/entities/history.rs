//! Stage history - when a subject entered a stage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::{Record, RecordKind};
use crate::store::normalize::{flex_datetime, flex_string};

/// One stage-entry record (status tracker)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageHistoryEntry {
    #[serde(default, deserialize_with = "flex_string")]
    pub id: String,

    #[serde(default, deserialize_with = "flex_string")]
    pub subject_id: String,

    /// Stage record id the subject entered
    #[serde(default, deserialize_with = "flex_string")]
    pub stage_id: String,

    #[serde(default, deserialize_with = "flex_string")]
    pub division: String,

    #[serde(
        default,
        deserialize_with = "flex_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<DateTime<Utc>>,
}

impl Record for StageHistoryEntry {
    const KIND: RecordKind = RecordKind::History;

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

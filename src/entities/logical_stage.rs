//! Logical stage - the cross-division milestone a stage record localizes

use serde::{Deserialize, Serialize};

use crate::core::entity::{Record, RecordKind};
use crate::store::normalize::{flex_bool, flex_opt_string, flex_string};

/// A logical stage (pizza status)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicalStage {
    /// Unique identifier
    #[serde(default, deserialize_with = "flex_string")]
    pub id: String,

    /// Milestone name
    #[serde(default, deserialize_with = "flex_string")]
    pub name: String,

    #[serde(
        default,
        deserialize_with = "flex_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    /// Population-inclusion flag; only operator milestones are resolved
    #[serde(default, deserialize_with = "flex_bool")]
    pub operator: bool,

    /// Provider milestone flag (informational)
    #[serde(default, deserialize_with = "flex_bool")]
    pub provider: bool,

    /// Tenant (client) this milestone belongs to
    #[serde(
        default,
        deserialize_with = "flex_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub tenant_id: Option<String>,

    /// Subjects at this milestone advance automatically once compliant
    #[serde(default, deserialize_with = "flex_bool")]
    pub auto_advance: bool,
}

impl LogicalStage {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            operator: true,
            ..Default::default()
        }
    }

    /// Whether subjects of the engine's population are tracked at this milestone
    pub fn is_population_included(&self) -> bool {
        self.operator
    }
}

impl Record for LogicalStage {
    const KIND: RecordKind = RecordKind::LogicalStages;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

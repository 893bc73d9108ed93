//! Stage record - one ordered lifecycle step localized to a division

use serde::{Deserialize, Serialize};

use crate::core::entity::{Record, RecordKind};
use crate::store::normalize::{flex_bool, flex_opt_string, flex_string};

/// Order assigned to records whose order index does not parse
pub const ORDER_SENTINEL: u32 = 9999;

/// Parse a stored order index
///
/// Values that are not a positive integer map to [`ORDER_SENTINEL`].
pub fn parse_order(raw: &str) -> u32 {
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => n,
        _ => ORDER_SENTINEL,
    }
}

/// Lifecycle state of a stage record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageLifecycle {
    Active,
    Deleted,
}

impl std::fmt::Display for StageLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageLifecycle::Active => write!(f, "active"),
            StageLifecycle::Deleted => write!(f, "deleted"),
        }
    }
}

/// A stage record (status type)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Unique identifier
    #[serde(default, deserialize_with = "flex_string")]
    pub id: String,

    /// Human-readable stage name (e.g. "ONBOARDING")
    #[serde(default, deserialize_with = "flex_string")]
    pub name: String,

    /// Division this stage is localized to
    #[serde(default, deserialize_with = "flex_string")]
    pub division: String,

    /// Order index, stored as a string
    #[serde(default, deserialize_with = "flex_string")]
    pub order: String,

    /// Soft-delete flag
    #[serde(default, deserialize_with = "flex_bool")]
    pub deleted: bool,

    /// Logical stage this record localizes
    #[serde(
        default,
        deserialize_with = "flex_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub logical_stage_id: Option<String>,

    /// Fleet population flag (excluded from the operator population)
    #[serde(default, deserialize_with = "flex_bool")]
    pub fleet: bool,

    /// Provider population flag (excluded from the operator population)
    #[serde(default, deserialize_with = "flex_bool")]
    pub providers: bool,
}

impl StageRecord {
    /// Create a new active stage record with no id yet
    pub fn new(
        name: impl Into<String>,
        division: impl Into<String>,
        order: u32,
        logical_stage_id: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            division: division.into(),
            order: order.to_string(),
            deleted: false,
            logical_stage_id: Some(logical_stage_id.into()),
            fleet: false,
            providers: false,
        }
    }

    /// Parsed order index (sentinel when unparsable)
    pub fn order_index(&self) -> u32 {
        parse_order(&self.order)
    }

    pub fn set_order(&mut self, order: u32) {
        self.order = order.to_string();
    }

    pub fn lifecycle(&self) -> StageLifecycle {
        if self.deleted {
            StageLifecycle::Deleted
        } else {
            StageLifecycle::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle() == StageLifecycle::Active
    }

    /// Active → Deleted. The order index is retained for a later restore.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// Deleted → Active, rebinding to the logical stage chosen at restore time
    pub fn restore(&mut self, logical_stage_id: impl Into<String>) {
        self.deleted = false;
        self.logical_stage_id = Some(logical_stage_id.into());
    }

    /// Whether either population-exclusion flag is set
    pub fn is_excluded_population(&self) -> bool {
        self.fleet || self.providers
    }

    /// Case-insensitive name match
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name.trim())
    }
}

impl Record for StageRecord {
    const KIND: RecordKind = RecordKind::Stages;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order() {
        assert_eq!(parse_order("3"), 3);
        assert_eq!(parse_order(" 12 "), 12);
        assert_eq!(parse_order(""), ORDER_SENTINEL);
        assert_eq!(parse_order("abc"), ORDER_SENTINEL);
        assert_eq!(parse_order("0"), ORDER_SENTINEL);
        assert_eq!(parse_order("-2"), ORDER_SENTINEL);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut stage = StageRecord::new("TRAINING", "D1", 2, "L1");
        assert_eq!(stage.lifecycle(), StageLifecycle::Active);

        stage.mark_deleted();
        assert_eq!(stage.lifecycle(), StageLifecycle::Deleted);
        assert_eq!(stage.order_index(), 2);

        stage.restore("L9");
        assert!(stage.is_active());
        assert_eq!(stage.logical_stage_id.as_deref(), Some("L9"));
    }

    #[test]
    fn test_deserialize_loose_values() {
        let json = serde_json::json!({
            "id": 4,
            "name": "FIELD",
            "division": "D1",
            "order": 3,
            "deleted": "0",
            "logical_stage_id": 17,
            "fleet": 1
        });
        let stage: StageRecord = serde_json::from_value(json).unwrap();
        assert_eq!(stage.id, "4");
        assert_eq!(stage.order_index(), 3);
        assert!(!stage.deleted);
        assert_eq!(stage.logical_stage_id.as_deref(), Some("17"));
        assert!(stage.is_excluded_population());
    }
}

//! Record trait - common interface for all stored record kinds

use serde::{de::DeserializeOwned, Serialize};

/// The record collections the engine reads and the store persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Subjects,
    Stages,
    LogicalStages,
    Bindings,
    Credentials,
    History,
}

impl RecordKind {
    /// All kinds, in load order
    pub const ALL: [RecordKind; 6] = [
        RecordKind::LogicalStages,
        RecordKind::Stages,
        RecordKind::Bindings,
        RecordKind::Subjects,
        RecordKind::Credentials,
        RecordKind::History,
    ];

    /// File stem used by file-backed stores
    pub fn file_stem(&self) -> &'static str {
        match self {
            RecordKind::Subjects => "subjects",
            RecordKind::Stages => "stages",
            RecordKind::LogicalStages => "logical_stages",
            RecordKind::Bindings => "bindings",
            RecordKind::Credentials => "credentials",
            RecordKind::History => "stage_history",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Subjects => write!(f, "subjects"),
            RecordKind::Stages => write!(f, "stage records"),
            RecordKind::LogicalStages => write!(f, "logical stages"),
            RecordKind::Bindings => write!(f, "requirement bindings"),
            RecordKind::Credentials => write!(f, "credentials"),
            RecordKind::History => write!(f, "stage history"),
        }
    }
}

/// Common trait for all stored records
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// The collection this record lives in
    const KIND: RecordKind;

    /// Get the record's id (empty for records not yet persisted)
    fn id(&self) -> &str;

    /// Assign an id (used by stores when appending new records)
    fn set_id(&mut self, id: String);

    /// The division the record belongs to, if the kind is division-scoped
    fn division(&self) -> Option<&str> {
        None
    }
}

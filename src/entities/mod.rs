//! Record type definitions

pub mod binding;
pub mod credential;
pub mod history;
pub mod logical_stage;
pub mod stage;
pub mod subject;

pub use binding::RequirementBinding;
pub use credential::Credential;
pub use history::StageHistoryEntry;
pub use logical_stage::LogicalStage;
pub use stage::{parse_order, StageLifecycle, StageRecord, ORDER_SENTINEL};
pub use subject::Subject;

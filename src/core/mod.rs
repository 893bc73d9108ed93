//! Core module - resolution engine, session and project plumbing

pub mod advance;
pub mod binding;
pub mod compliance;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod history;
pub mod ordering;
pub mod project;
pub mod report;
pub mod requirements;
pub mod scope;
pub mod session;
pub mod workflow;

#[cfg(test)]
pub(crate) mod fixtures;

pub use advance::{AdvanceCandidate, AdvanceDecision, AdvanceResult, GroupFailure, NotEligible, Recalculation};
pub use binding::{BindOutcome, BindRequest, BindingConflict, Resolution};
pub use compliance::{ComplianceQuery, ComplianceSummary, StageCompliance, StageValidation};
pub use config::{Config, ConfigLayer};
pub use context::{ResolutionContext, Snapshot};
pub use entity::{Record, RecordKind};
pub use error::EngineError;
pub use ordering::{Direction, InsertRequest, Inserted, OrderChange};
pub use project::{Project, ProjectError};
pub use requirements::RequirementSet;
pub use scope::{DivisionSelector, Scope};
pub use session::{EditSession, SaveReport};
pub use workflow::{Workflow, WorkflowStep};

//! Workflow resolver
//!
//! Materializes the ordered stage sequence visible in a scope. Stage records
//! are filtered through the scope predicate, stable-sorted by parsed order
//! (unparsable orders sort last, ties keep stored position) and, when the
//! scope spans every division, deduplicated by stage name.

use serde::Serialize;
use std::collections::HashSet;

use crate::core::context::ResolutionContext;
use crate::entities::StageRecord;

/// One resolved step of a workflow
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WorkflowStep<'a> {
    pub name: &'a str,
    pub order: u32,
    pub logical_stage_id: &'a str,
    #[serde(skip)]
    pub record: &'a StageRecord,
}

impl<'a> WorkflowStep<'a> {
    fn from_record(record: &'a StageRecord) -> Self {
        Self {
            name: &record.name,
            order: record.order_index(),
            logical_stage_id: record.logical_stage_id.as_deref().unwrap_or_default(),
            record,
        }
    }

    pub fn stage_id(&self) -> &'a str {
        &self.record.id
    }

    pub fn division(&self) -> &'a str {
        &self.record.division
    }
}

/// The current workflow for a scope
#[derive(Debug, Clone, Default, Serialize)]
pub struct Workflow<'a> {
    steps: Vec<WorkflowStep<'a>>,
}

impl<'a> Workflow<'a> {
    pub fn steps(&self) -> &[WorkflowStep<'a>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WorkflowStep<'a>> {
        self.steps.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkflowStep<'a>> {
        self.steps.iter()
    }

    /// Position of the step backed by a stage record id
    pub fn position_of(&self, stage_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.record.id == stage_id)
    }

    /// Position of the first step whose name matches (case-insensitive)
    pub fn position_by_name(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.record.name_matches(name))
    }
}

/// Stable sort of stage records by parsed order index
pub fn order_stages<'a, I>(records: I) -> Vec<&'a StageRecord>
where
    I: IntoIterator<Item = &'a StageRecord>,
{
    let mut ordered: Vec<&StageRecord> = records.into_iter().collect();
    ordered.sort_by_key(|r| r.order_index());
    ordered
}

/// Resolve the ordered workflow visible in the context's scope
///
/// Never mutates the snapshot.
pub fn resolve_workflow<'a>(ctx: &ResolutionContext<'a>) -> Workflow<'a> {
    let ordered = order_stages(ctx.visible_stages());

    let steps: Vec<WorkflowStep<'a>> = if ctx.scope().is_all() {
        let mut seen = HashSet::new();
        ordered
            .into_iter()
            .filter(|r| seen.insert(r.name.as_str()))
            .map(WorkflowStep::from_record)
            .collect()
    } else {
        ordered.into_iter().map(WorkflowStep::from_record).collect()
    };

    tracing::debug!(scope = %ctx.scope(), steps = steps.len(), "resolved workflow");
    Workflow { steps }
}

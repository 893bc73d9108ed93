//! Auto-advance resolver
//!
//! [`decide`] is a pure function of the snapshot: it never moves a subject.
//! [`recalculate`] plans every subject of a division, then persists the
//! eligible moves through the store's bulk stage update.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::compliance::evaluate;
use crate::core::context::{ResolutionContext, Snapshot};
use crate::core::error::EngineError;
use crate::core::requirements::resolve_for_stage;
use crate::core::scope::Scope;
use crate::entities::{StageHistoryEntry, StageRecord, Subject};
use crate::store::{BulkStageUpdate, RecordStore};

/// Why a subject will not auto-advance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NotEligible {
    /// The current stage record cannot be resolved
    StageNotFound,
    /// The current stage is hidden by the scope
    OutOfScope,
    /// The logical stage is not flagged for automatic progression
    AutoAdvanceOff,
    /// Some requirements of the current stage are not held
    MissingCredentials { missing: Vec<String> },
    /// No later stage with a different logical stage exists
    NoNextStage,
}

impl std::fmt::Display for NotEligible {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotEligible::StageNotFound => write!(f, "current stage not found"),
            NotEligible::OutOfScope => write!(f, "current stage is outside the selected scope"),
            NotEligible::AutoAdvanceOff => write!(f, "auto-advance is off for this stage"),
            NotEligible::MissingCredentials { missing } => {
                write!(f, "missing {}", missing.join(", "))
            }
            NotEligible::NoNextStage => write!(f, "no next stage"),
        }
    }
}

/// Auto-advance state of one subject
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AdvanceDecision<'a> {
    NotEligible(NotEligible),
    /// Flagged for auto-advance but nothing is required, so nothing triggers it
    EligibleNoRequirements,
    EligibleComplete {
        #[serde(serialize_with = "serialize_stage_name")]
        target: &'a StageRecord,
    },
}

fn serialize_stage_name<S: serde::Serializer>(stage: &&StageRecord, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&stage.name)
}

impl<'a> AdvanceDecision<'a> {
    /// The stage to move to, only for complete subjects
    pub fn target(&self) -> Option<&'a StageRecord> {
        match self {
            AdvanceDecision::EligibleComplete { target } => Some(*target),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AdvanceDecision::NotEligible(reason) => reason.to_string(),
            AdvanceDecision::EligibleNoRequirements => "no requirements to complete".to_string(),
            AdvanceDecision::EligibleComplete { target } => format!("all requirements met, next: {}", target.name),
        }
    }
}

/// First visible stage of the division after `current` with a different logical stage
///
/// Ties on order resolve to the earliest stored record.
pub fn next_stage_record<'a>(ctx: &ResolutionContext<'a>, current: &StageRecord) -> Option<&'a StageRecord> {
    let local = ctx.narrowed_to(&current.division);
    let order = current.order_index();
    let logical = current.logical_stage_id.as_deref();

    local
        .visible_stages()
        .filter(|s| s.order_index() > order && s.logical_stage_id.as_deref() != logical)
        .fold(None, |best: Option<&'a StageRecord>, s| match best {
            Some(b) if b.order_index() <= s.order_index() => Some(b),
            _ => Some(s),
        })
}

/// Auto-advance decision for one subject
pub fn decide<'a>(ctx: &ResolutionContext<'a>, subject: &'a Subject) -> AdvanceDecision<'a> {
    let snapshot = ctx.snapshot();
    let Some(stage) = snapshot.current_stage_record(subject) else {
        return AdvanceDecision::NotEligible(NotEligible::StageNotFound);
    };
    let local = ctx.narrowed_to(&subject.division);
    if !local.is_visible(stage) {
        return AdvanceDecision::NotEligible(NotEligible::OutOfScope);
    }
    let auto = stage
        .logical_stage_id
        .as_deref()
        .and_then(|id| snapshot.logical_stage(id))
        .is_some_and(|l| l.auto_advance);
    if !auto {
        return AdvanceDecision::NotEligible(NotEligible::AutoAdvanceOff);
    }

    let requirements = resolve_for_stage(&local, stage);
    if requirements.is_empty() {
        return AdvanceDecision::EligibleNoRequirements;
    }
    let compliance = evaluate(&snapshot.held_credentials(subject), &requirements, ctx.now());
    if compliance.missing() > 0 {
        let missing = compliance
            .missing_credentials()
            .into_iter()
            .map(str::to_string)
            .collect();
        return AdvanceDecision::NotEligible(NotEligible::MissingCredentials { missing });
    }

    match next_stage_record(&local, stage) {
        Some(target) => AdvanceDecision::EligibleComplete { target },
        None => AdvanceDecision::NotEligible(NotEligible::NoNextStage),
    }
}

/// Next stage for a subject regardless of eligibility
pub fn next_stage<'a>(ctx: &ResolutionContext<'a>, subject: &Subject) -> Result<Option<&'a StageRecord>, EngineError> {
    let stage = ctx
        .snapshot()
        .current_stage_record(subject)
        .ok_or_else(|| EngineError::not_found("current stage", format!("{} ({})", subject.stage_name, subject.id)))?;
    Ok(next_stage_record(ctx, stage))
}

/// A subject the resolver would move, with the proposed stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvanceCandidate {
    pub subject_id: String,
    pub subject: String,
    pub division: String,
    pub from: String,
    pub to: String,
    pub to_stage_id: String,
    pub to_order: u32,
}

/// Every subject of the scope in the eligible-complete state
pub fn candidates(ctx: &ResolutionContext<'_>) -> Vec<AdvanceCandidate> {
    ctx.subjects_in_scope()
        .filter_map(|subject| {
            let target = decide(ctx, subject).target()?;
            Some(AdvanceCandidate {
                subject_id: subject.id.clone(),
                subject: subject.display_name(),
                division: subject.division.clone(),
                from: subject.stage_name.clone(),
                to: target.name.clone(),
                to_stage_id: target.id.clone(),
                to_order: target.order_index(),
            })
        })
        .collect()
}

/// Outcome of bulk recalculation for one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvanceResult {
    pub subject_id: String,
    pub subject: String,
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub changed: bool,
    pub reason: String,
}

/// Plan auto-advance for every subject in scope without changing anything
pub fn plan(ctx: &ResolutionContext<'_>) -> Vec<AdvanceResult> {
    ctx.subjects_in_scope()
        .map(|subject| {
            let decision = decide(ctx, subject);
            AdvanceResult {
                subject_id: subject.id.clone(),
                subject: subject.display_name(),
                from: subject.stage_name.clone(),
                to: decision.target().map(|t| t.name.clone()),
                changed: false,
                reason: decision.describe(),
            }
        })
        .collect()
}

/// A target-stage group whose move did not fully persist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupFailure {
    pub stage: String,
    pub subject_ids: Vec<String>,
    /// Whether the subjects themselves were moved in the store
    pub moved: bool,
    pub error: String,
}

/// Per-subject outcomes of bulk recalculation plus the failed groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Recalculation {
    pub results: Vec<AdvanceResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<GroupFailure>,
}

impl Recalculation {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn moved(&self) -> usize {
        self.results.iter().filter(|r| r.changed).count()
    }
}

/// Evaluate a division and advance every eligible-complete subject
///
/// Moves are persisted through [`RecordStore::update_subject_stages`],
/// one call per target stage. A failing group does not stop the run: its
/// subjects are re-read from the store so the snapshot mirrors exactly the
/// moves that persisted, and the failure is reported in the result.
pub fn recalculate<S: RecordStore>(
    snapshot: &mut Snapshot,
    scope: &Scope,
    store: &mut S,
) -> Result<Recalculation, EngineError> {
    if scope.is_all() {
        return Err(EngineError::ScopeRequired);
    }

    let (results, updates) = {
        let ctx = ResolutionContext::new(snapshot, scope.clone());
        let mut updates: BTreeMap<String, BulkStageUpdate> = BTreeMap::new();
        for subject in ctx.subjects_in_scope() {
            if let Some(target) = decide(&ctx, subject).target() {
                updates
                    .entry(target.id.clone())
                    .or_insert_with(|| BulkStageUpdate {
                        subject_ids: Vec::new(),
                        stage_id: target.id.clone(),
                        stage_name: target.name.clone(),
                        order: target.order_index().to_string(),
                    })
                    .subject_ids
                    .push(subject.id.clone());
            }
        }
        (plan(&ctx), updates)
    };
    let mut report = Recalculation {
        results,
        failures: Vec::new(),
    };

    let now = chrono::Utc::now();
    for update in updates.values() {
        let (moved_ids, history_written) = match store.update_subject_stages(update) {
            Ok(moved) => {
                tracing::info!(stage = %update.stage_name, subjects = moved, "auto-advanced subjects");
                (update.subject_ids.clone(), true)
            }
            Err(e) => {
                let moved_ids = persisted_moves(store, update);
                tracing::warn!(
                    stage = %update.stage_name,
                    error = %e,
                    moved = moved_ids.len(),
                    "auto-advance group failed to save"
                );
                report.failures.push(GroupFailure {
                    stage: update.stage_name.clone(),
                    subject_ids: update.subject_ids.clone(),
                    moved: !moved_ids.is_empty(),
                    error: e.to_string(),
                });
                for result in report.results.iter_mut() {
                    if !update.subject_ids.contains(&result.subject_id) {
                        continue;
                    }
                    result.reason = if moved_ids.contains(&result.subject_id) {
                        format!("moved, but stage history was not recorded: {}", e)
                    } else {
                        format!("not saved: {}", e)
                    };
                }
                (moved_ids, false)
            }
        };

        for subject in snapshot.subjects_mut().iter_mut() {
            if moved_ids.contains(&subject.id) {
                subject.stage_id = Some(update.stage_id.clone());
                subject.stage_name = update.stage_name.clone();
                subject.order = Some(update.order.clone());
            }
        }
        if history_written {
            let entries: Vec<StageHistoryEntry> = moved_ids
                .iter()
                .map(|id| StageHistoryEntry {
                    id: String::new(),
                    subject_id: id.clone(),
                    stage_id: update.stage_id.clone(),
                    division: scope.division.to_string(),
                    date: Some(now),
                })
                .collect();
            snapshot.history_mut().extend(entries);
        }

        for result in report.results.iter_mut() {
            if moved_ids.contains(&result.subject_id) {
                result.changed = true;
            }
        }
    }

    Ok(report)
}

/// Subjects of a group the store already shows at the target stage
fn persisted_moves<S: RecordStore>(store: &S, update: &BulkStageUpdate) -> Vec<String> {
    match store.get_all::<Subject>() {
        Ok(stored) => stored
            .into_iter()
            .filter(|s| {
                update.subject_ids.contains(&s.id) && s.stage_id.as_deref() == Some(update.stage_id.as_str())
            })
            .map(|s| s.id)
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "could not re-read subjects after a failed stage update");
            Vec::new()
        }
    }
}

//! Compliance evaluator
//!
//! Two distinct notions live here and are kept apart on purpose:
//!
//! - **Stage compliance** partitions one stage's requirements into held-valid,
//!   held-expired and missing for a subject. [`is_cumulatively_valid`] extends
//!   this to the requirements of every earlier workflow step with a different
//!   logical stage.
//! - **Aggregate compliance** counts one slot per subject and requirement of
//!   the subject's *current* stage only, fulfilled by a valid credential.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::core::context::{ResolutionContext, Snapshot};
use crate::core::requirements::{resolve_direct, resolve_for_stage, RequirementSet};
use crate::core::scope::Scope;
use crate::core::workflow::{resolve_workflow, Workflow};
use crate::entities::{Credential, RequirementBinding, Subject};
use crate::store::{FileStore, MemoryStore, StoreError};

/// How a subject stands against one requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fulfillment {
    HeldValid,
    HeldExpired,
    Missing,
}

impl std::fmt::Display for Fulfillment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fulfillment::HeldValid => write!(f, "valid"),
            Fulfillment::HeldExpired => write!(f, "expired"),
            Fulfillment::Missing => write!(f, "missing"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RequirementStatus<'a> {
    pub binding: &'a RequirementBinding,
    pub fulfillment: Fulfillment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<&'a Credential>,
}

/// A subject's standing against one stage's requirements
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageCompliance<'a> {
    pub statuses: Vec<RequirementStatus<'a>>,
}

impl<'a> StageCompliance<'a> {
    fn count(&self, wanted: Fulfillment) -> usize {
        self.statuses.iter().filter(|s| s.fulfillment == wanted).count()
    }

    pub fn required(&self) -> usize {
        self.statuses.len()
    }

    pub fn valid(&self) -> usize {
        self.count(Fulfillment::HeldValid)
    }

    pub fn expired(&self) -> usize {
        self.count(Fulfillment::HeldExpired)
    }

    pub fn missing(&self) -> usize {
        self.count(Fulfillment::Missing)
    }

    /// Nothing missing and at least one requirement
    pub fn is_complete(&self) -> bool {
        self.required() > 0 && self.missing() == 0
    }

    pub fn missing_credentials(&self) -> Vec<&'a str> {
        self.statuses
            .iter()
            .filter(|s| s.fulfillment == Fulfillment::Missing)
            .map(|s| s.binding.credential.as_str())
            .collect()
    }
}

/// Classify one requirement against a subject's held credentials
pub fn fulfillment_of<'a>(
    held: &[&'a Credential],
    binding_id: &str,
    now: DateTime<Utc>,
) -> (Fulfillment, Option<&'a Credential>) {
    let mut expired = None;
    for credential in held.iter().filter(|c| c.counts() && c.satisfies(binding_id)) {
        if !credential.is_expired(now) {
            return (Fulfillment::HeldValid, Some(*credential));
        }
        expired.get_or_insert(*credential);
    }
    match expired {
        Some(c) => (Fulfillment::HeldExpired, Some(c)),
        None => (Fulfillment::Missing, None),
    }
}

/// Partition a requirement set against held credentials
pub fn evaluate<'a>(
    held: &[&'a Credential],
    requirements: &RequirementSet<'a>,
    now: DateTime<Utc>,
) -> StageCompliance<'a> {
    let statuses = requirements
        .bindings()
        .iter()
        .map(|&binding| {
            let (fulfillment, credential) = fulfillment_of(held, &binding.id, now);
            RequirementStatus {
                binding,
                fulfillment,
                credential,
            }
        })
        .collect();
    StageCompliance { statuses }
}

/// Stage compliance of a subject at their current stage
///
/// A subject whose current stage cannot be resolved has no requirements.
pub fn evaluate_subject<'a>(ctx: &ResolutionContext<'a>, subject: &'a Subject) -> StageCompliance<'a> {
    let snapshot = ctx.snapshot();
    let Some(stage) = snapshot.current_stage_record(subject) else {
        tracing::debug!(subject = %subject.id, stage = %subject.stage_name, "current stage not found");
        return StageCompliance::default();
    };
    let requirements = resolve_for_stage(ctx, stage);
    evaluate(&snapshot.held_credentials(subject), &requirements, ctx.now())
}

/// Requirements of a workflow step plus those of every earlier step with a
/// different logical stage, evaluated in one division
pub fn cumulative_requirements<'a>(
    ctx: &ResolutionContext<'a>,
    workflow: &Workflow<'a>,
    index: usize,
    division: &str,
) -> RequirementSet<'a> {
    let local = ctx.narrowed_to(division);
    let mut set = RequirementSet::default();
    let Some(current) = workflow.get(index) else {
        return set;
    };
    set.extend(resolve_direct(&local, current.logical_stage_id));
    for step in workflow.steps()[..index].iter() {
        if step.logical_stage_id != current.logical_stage_id {
            set.extend(resolve_direct(&local, step.logical_stage_id));
        }
    }
    set
}

/// Cumulative requirements a subject lacks at their current stage
pub fn cumulative_missing<'a>(
    ctx: &ResolutionContext<'a>,
    workflow: &Workflow<'a>,
    subject: &'a Subject,
) -> Vec<&'a RequirementBinding> {
    let snapshot = ctx.snapshot();
    let index = snapshot
        .current_stage_record(subject)
        .and_then(|stage| workflow.position_of(&stage.id))
        .or_else(|| workflow.position_by_name(&subject.stage_name));
    let Some(index) = index else {
        return Vec::new();
    };

    let held = snapshot.held_credentials(subject);
    cumulative_requirements(ctx, workflow, index, &subject.division)
        .bindings()
        .iter()
        .copied()
        .filter(|b| !held.iter().any(|c| c.counts() && c.satisfies(&b.id)))
        .collect()
}

/// Whether a subject holds every cumulative requirement of their stage
///
/// The workflow is resolved in the subject's own division.
pub fn is_cumulatively_valid(ctx: &ResolutionContext<'_>, subject: &Subject) -> bool {
    let local = ctx.narrowed_to(&subject.division);
    let workflow = resolve_workflow(&local);
    cumulative_missing(&local, &workflow, subject).is_empty()
}

/// Cumulative validity of the subjects at one workflow step
#[derive(Debug, Clone, Serialize)]
pub struct StageValidation {
    pub stage: String,
    pub stage_id: String,
    pub subjects: usize,
    pub failing: usize,
}

impl StageValidation {
    /// A step with nobody in it is valid
    pub fn is_valid(&self) -> bool {
        self.failing == 0
    }
}

/// Subjects of the scope whose current stage name matches a step
pub(crate) fn subjects_at<'a>(ctx: &ResolutionContext<'a>, stage_name: &str) -> Vec<&'a Subject> {
    ctx.subjects_in_scope()
        .filter(|s| s.is_at_stage(stage_name))
        .collect()
}

/// Per workflow step, how many subjects there fail cumulative validity
pub fn validate_stage_population(ctx: &ResolutionContext<'_>) -> Vec<StageValidation> {
    let workflow = resolve_workflow(ctx);
    let mut per_division: HashMap<String, Workflow<'_>> = HashMap::new();

    workflow
        .iter()
        .map(|step| {
            let subjects = subjects_at(ctx, step.name);
            let mut failing = 0;
            for &subject in &subjects {
                let local = ctx.narrowed_to(&subject.division);
                let division_flow = per_division
                    .entry(subject.division.clone())
                    .or_insert_with(|| resolve_workflow(&local));
                if !cumulative_missing(&local, division_flow, subject).is_empty() {
                    failing += 1;
                }
            }
            StageValidation {
                stage: step.name.to_string(),
                stage_id: step.stage_id().to_string(),
                subjects: subjects.len(),
                failing,
            }
        })
        .collect()
}

/// Population-wide slot compliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ComplianceSummary {
    pub total_required_slots: usize,
    pub fulfilled_slots: usize,
    pub percent: u32,
}

impl ComplianceSummary {
    pub fn from_counts(total_required_slots: usize, fulfilled_slots: usize) -> Self {
        let percent = if total_required_slots == 0 {
            0
        } else {
            (fulfilled_slots as f64 / total_required_slots as f64 * 100.0).round() as u32
        };
        Self {
            total_required_slots,
            fulfilled_slots,
            percent,
        }
    }
}

/// Aggregate slot compliance over the subjects of a scope
///
/// Only each subject's current stage counts, and only when that stage is
/// visible in the scope. A slot is fulfilled by an approved, non-deleted,
/// unexpired credential for the binding.
pub fn aggregate_compliance(ctx: &ResolutionContext<'_>) -> ComplianceSummary {
    let snapshot = ctx.snapshot();
    let mut total = 0;
    let mut fulfilled = 0;

    for subject in ctx.subjects_in_scope() {
        let Some(stage) = snapshot.current_stage_record(subject) else {
            continue;
        };
        if !ctx.is_visible(stage) {
            continue;
        }
        let held = snapshot.held_credentials(subject);
        for binding in resolve_for_stage(ctx, stage).bindings() {
            total += 1;
            if fulfillment_of(&held, &binding.id, ctx.now()).0 == Fulfillment::HeldValid {
                fulfilled += 1;
            }
        }
    }

    let summary = ComplianceSummary::from_counts(total, fulfilled);
    tracing::debug!(scope = %ctx.scope(), ?summary, "aggregate compliance");
    summary
}

/// An external batch source of aggregate compliance
///
/// `as_of` is the instant credential expiry is judged against.
pub trait ComplianceQuery {
    fn aggregate(&self, scope: &Scope, as_of: DateTime<Utc>) -> Result<ComplianceSummary, StoreError>;
}

impl ComplianceQuery for FileStore {
    fn aggregate(&self, scope: &Scope, as_of: DateTime<Utc>) -> Result<ComplianceSummary, StoreError> {
        let snapshot = Snapshot::load(self)?;
        Ok(aggregate_compliance(&ResolutionContext::new(&snapshot, scope.clone()).as_of(as_of)))
    }
}

impl ComplianceQuery for MemoryStore {
    fn aggregate(&self, scope: &Scope, as_of: DateTime<Utc>) -> Result<ComplianceSummary, StoreError> {
        let snapshot = Snapshot::load(self)?;
        Ok(aggregate_compliance(&ResolutionContext::new(&snapshot, scope.clone()).as_of(as_of)))
    }
}

/// Ask the batch query first, recompute locally when it fails or is absent
pub fn summary_with_fallback<Q>(query: Option<&Q>, ctx: &ResolutionContext<'_>) -> ComplianceSummary
where
    Q: ComplianceQuery + ?Sized,
{
    match query.map(|q| q.aggregate(ctx.scope(), ctx.now())) {
        Some(Ok(summary)) => summary,
        Some(Err(e)) => {
            tracing::warn!(error = %e, scope = %ctx.scope(), "aggregate compliance query failed, recomputing locally");
            aggregate_compliance(ctx)
        }
        None => aggregate_compliance(ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures;
    use crate::core::scope::Scope;
    use crate::store::RecordKind;

    fn ctx(snapshot: &Snapshot, scope: Scope) -> ResolutionContext<'_> {
        ResolutionContext::new(snapshot, scope).as_of(fixtures::now())
    }

    #[test]
    fn test_partial_holder_is_not_complete() {
        let snapshot = fixtures::snapshot();
        let ctx = ctx(&snapshot, Scope::division("D1"));
        let ann = snapshot.subject("s-ann").unwrap();
        let result = evaluate_subject(&ctx, ann);
        assert_eq!(result.required(), 2);
        assert_eq!(result.valid(), 1);
        assert_eq!(result.missing(), 1);
        assert!(!result.is_complete());
        assert_eq!(result.missing_credentials(), vec!["DRUG TEST"]);
    }

    #[test]
    fn test_expired_is_held_but_not_valid() {
        let snapshot = fixtures::snapshot();
        let ctx = ctx(&snapshot, Scope::division("D1"));
        let cat = snapshot.subject("s-cat").unwrap();
        let result = evaluate_subject(&ctx, cat);
        assert_eq!(result.required(), 1);
        assert_eq!(result.expired(), 1);
        assert_eq!(result.missing(), 0);
        assert!(result.is_complete());
    }

    #[test]
    fn test_no_requirements_is_never_complete() {
        let snapshot = fixtures::snapshot();
        let ctx = ctx(&snapshot, Scope::all());
        let mut nobody = Subject::new("s-x", "D2", "ONBOARD");
        nobody.stage_id = Some("d2-onboard".into());
        let result = evaluate_subject(&ctx, &nobody);
        assert_eq!(result.required(), 0);
        assert!(!result.is_complete());
    }

    #[test]
    fn test_unapproved_credential_counts_as_missing() {
        let snapshot = fixtures::snapshot();
        let held = snapshot.held_credentials(snapshot.subject("s-cat").unwrap());
        let (fulfillment, _) = fulfillment_of(&held, "b-bg", fixtures::now());
        assert_eq!(fulfillment, Fulfillment::Missing);
    }

    #[test]
    fn test_cumulative_adds_earlier_steps_with_other_logical_stage() {
        let snapshot = fixtures::snapshot();
        let ctx = ctx(&snapshot, Scope::division("D1"));
        let workflow = resolve_workflow(&ctx);
        let at_phase_two = cumulative_requirements(&ctx, &workflow, 2, "D1");
        assert_eq!(at_phase_two.binding_ids(), vec!["b-cpr", "b-drug", "b-bg"]);
        let at_field = cumulative_requirements(&ctx, &workflow, 3, "D1");
        assert_eq!(at_field.binding_ids(), vec!["b-cdl", "b-bg", "b-cpr", "b-drug"]);
    }

    #[test]
    fn test_cumulative_validity() {
        let snapshot = fixtures::snapshot();
        let ctx = ctx(&snapshot, Scope::all());
        assert!(!is_cumulatively_valid(&ctx, snapshot.subject("s-ann").unwrap()));
        assert!(is_cumulatively_valid(&ctx, snapshot.subject("s-bob").unwrap()));
        // expired CDL still counts, unapproved background check does not
        assert!(!is_cumulatively_valid(&ctx, snapshot.subject("s-cat").unwrap()));
    }

    #[test]
    fn test_population_validation_counts_failures_per_step() {
        let snapshot = fixtures::snapshot();
        let ctx = ctx(&snapshot, Scope::division("D1"));
        let report = validate_stage_population(&ctx);
        let training = report.iter().find(|r| r.stage == "TRAINING").unwrap();
        assert_eq!(training.subjects, 2);
        assert_eq!(training.failing, 1);
        assert!(!training.is_valid());
        let applied = report.iter().find(|r| r.stage == "APPLIED").unwrap();
        assert_eq!(applied.subjects, 0);
        assert!(applied.is_valid());
    }

    #[test]
    fn test_aggregate_counts_current_stage_slots() {
        let snapshot = fixtures::snapshot();
        // ann 1/2, bob 2/2, cat 0/1 (expired)
        let summary = aggregate_compliance(&ctx(&snapshot, Scope::division("D1")));
        assert_eq!(summary, ComplianceSummary::from_counts(5, 3));
        assert_eq!(summary.percent, 60);

        // plus dan 1/1
        let summary = aggregate_compliance(&ctx(&snapshot, Scope::all()));
        assert_eq!((summary.total_required_slots, summary.fulfilled_slots), (6, 4));
        assert_eq!(summary.percent, 67);
    }

    #[test]
    fn test_summary_percent_identity() {
        assert_eq!(ComplianceSummary::from_counts(0, 0).percent, 0);
        assert_eq!(ComplianceSummary::from_counts(3, 1).percent, 33);
        assert_eq!(ComplianceSummary::from_counts(3, 2).percent, 67);
        assert_eq!(ComplianceSummary::from_counts(8, 1).percent, 13);
    }

    #[test]
    fn test_store_query_judges_expiry_at_context_instant() {
        use chrono::TimeZone;

        let snapshot = fixtures::snapshot();
        let store = MemoryStore::new()
            .with_records(snapshot.stages())
            .with_records(snapshot.logical_stages())
            .with_records(snapshot.bindings())
            .with_records(snapshot.subjects())
            .with_records(snapshot.credentials());

        // cat's CDL expires 2020-01-01, so it still counts here
        let before_expiry = Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap();
        let ctx = ResolutionContext::new(&snapshot, Scope::division("D1")).as_of(before_expiry);
        let local = aggregate_compliance(&ctx);
        assert_eq!(local, ComplianceSummary::from_counts(5, 4));
        assert_eq!(summary_with_fallback(Some(&store), &ctx), local);

        let ctx = ctx.as_of(fixtures::now());
        assert_eq!(summary_with_fallback(Some(&store), &ctx), ComplianceSummary::from_counts(5, 3));
    }

    #[test]
    fn test_fallback_recomputes_when_query_fails() {
        let snapshot = fixtures::snapshot();
        let ctx = ctx(&snapshot, Scope::division("D1"));

        struct Broken;
        impl ComplianceQuery for Broken {
            fn aggregate(&self, _scope: &Scope, _as_of: DateTime<Utc>) -> Result<ComplianceSummary, StoreError> {
                Err(StoreError::Unavailable {
                    kind: RecordKind::Credentials,
                    message: "offline".into(),
                })
            }
        }

        assert_eq!(summary_with_fallback(Some(&Broken), &ctx), aggregate_compliance(&ctx));
        assert_eq!(summary_with_fallback::<Broken>(None, &ctx), aggregate_compliance(&ctx));
    }
}

//! Structured stage reports: distribution, per-stage compliance, bottlenecks
//!
//! Reports are plain data; rendering belongs to the caller.

use serde::Serialize;
use std::collections::HashSet;

use crate::core::binding::normalize_credential_name;
use crate::core::compliance::{evaluate_subject, fulfillment_of, subjects_at, Fulfillment};
use crate::core::context::ResolutionContext;
use crate::core::requirements::{resolve_direct, resolve_for_stage};
use crate::core::workflow::resolve_workflow;

/// Subject count of one workflow step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageCount {
    pub stage: String,
    pub stage_id: String,
    pub order: u32,
    pub subjects: usize,
}

/// Where the subjects of a scope currently sit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageDistribution {
    pub stages: Vec<StageCount>,
    /// Subjects whose stage name matches no workflow step
    pub unmatched: usize,
}

/// Count subjects per workflow step
///
/// A subject's stage name is matched exactly first, then case-insensitively.
pub fn stage_distribution(ctx: &ResolutionContext<'_>) -> StageDistribution {
    let workflow = resolve_workflow(ctx);
    let mut counts = vec![0usize; workflow.len()];
    let mut unmatched = 0;

    for subject in ctx.subjects_in_scope() {
        let name = subject.stage_name.trim();
        let slot = workflow
            .iter()
            .position(|s| s.name == name)
            .or_else(|| workflow.position_by_name(name));
        match slot {
            Some(i) => counts[i] += 1,
            None => unmatched += 1,
        }
    }

    StageDistribution {
        stages: workflow
            .iter()
            .zip(counts)
            .map(|(step, subjects)| StageCount {
                stage: step.name.to_string(),
                stage_id: step.stage_id().to_string(),
                order: step.order,
                subjects,
            })
            .collect(),
        unmatched,
    }
}

/// Holders of one required credential among a step's subjects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialCoverage {
    pub credential: String,
    pub holders: usize,
}

/// Compliance of the subjects at one workflow step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub stage_id: String,
    pub order: u32,
    /// Every credential required at this step
    pub required: Vec<String>,
    /// Required credentials not already required at an earlier step with another logical stage
    pub introduced: Vec<String>,
    pub subjects: usize,
    /// Subjects missing none of their current requirements
    pub compliant: usize,
    pub coverage: Vec<CredentialCoverage>,
}

impl StageReport {
    /// Share of compliant subjects; an empty step counts as fully compliant
    pub fn ratio(&self) -> f64 {
        if self.subjects == 0 {
            1.0
        } else {
            self.compliant as f64 / self.subjects as f64
        }
    }
}

/// Per-step compliance report for the scope's workflow
pub fn stage_report(ctx: &ResolutionContext<'_>) -> Vec<StageReport> {
    let snapshot = ctx.snapshot();
    let workflow = resolve_workflow(ctx);
    let mut reports = Vec::with_capacity(workflow.len());

    for (index, step) in workflow.iter().enumerate() {
        let required: Vec<String> = resolve_direct(ctx, step.logical_stage_id)
            .names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let earlier: HashSet<String> = workflow.steps()[..index]
            .iter()
            .filter(|s| s.logical_stage_id != step.logical_stage_id)
            .flat_map(|s| resolve_direct(ctx, s.logical_stage_id).names())
            .map(normalize_credential_name)
            .collect();
        let introduced = required
            .iter()
            .filter(|name| !earlier.contains(&normalize_credential_name(name)))
            .cloned()
            .collect();

        let subjects = subjects_at(ctx, step.name);
        let compliant = subjects
            .iter()
            .filter(|s| evaluate_subject(ctx, s).missing() == 0)
            .count();

        let coverage = required
            .iter()
            .map(|credential| {
                let wanted = normalize_credential_name(credential);
                let holders = subjects
                    .iter()
                    .filter(|subject| {
                        let Some(stage) = snapshot.current_stage_record(subject) else {
                            return false;
                        };
                        let held = snapshot.held_credentials(subject);
                        resolve_for_stage(ctx, stage)
                            .bindings()
                            .iter()
                            .filter(|b| normalize_credential_name(&b.credential) == wanted)
                            .any(|b| fulfillment_of(&held, &b.id, ctx.now()).0 == Fulfillment::HeldValid)
                    })
                    .count();
                CredentialCoverage {
                    credential: credential.clone(),
                    holders,
                }
            })
            .collect();

        reports.push(StageReport {
            stage: step.name.to_string(),
            stage_id: step.stage_id().to_string(),
            order: step.order,
            required,
            introduced,
            subjects: subjects.len(),
            compliant,
            coverage,
        });
    }
    reports
}

/// Occupied steps ordered from least to most compliant
pub fn bottlenecks(reports: &[StageReport]) -> Vec<&StageReport> {
    let mut occupied: Vec<&StageReport> = reports.iter().filter(|r| r.subjects > 0).collect();
    occupied.sort_by(|a, b| a.ratio().total_cmp(&b.ratio()));
    occupied
}

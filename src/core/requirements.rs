//! Requirement resolver
//!
//! Two lookups answer "which credentials are required here". The direct
//! path starts from a logical stage id. The derived path starts from a stage
//! name, finds the visible stage records carrying it and unions the direct
//! lookup over their logical stage ids. For a stage visible in a scope both
//! return the same credential names.

use serde::Serialize;
use std::collections::HashSet;

use crate::core::binding::normalize_credential_name;
use crate::core::context::ResolutionContext;
use crate::core::scope::is_logical_stage_in_scope;
use crate::entities::{RequirementBinding, StageRecord};

/// Requirement bindings resolved for one stage in one scope
///
/// Bindings are unique by id and kept in snapshot order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequirementSet<'a> {
    bindings: Vec<&'a RequirementBinding>,
}

impl<'a> RequirementSet<'a> {
    fn push(&mut self, binding: &'a RequirementBinding) {
        if !self.bindings.iter().any(|b| b.id == binding.id) {
            self.bindings.push(binding);
        }
    }

    pub fn bindings(&self) -> &[&'a RequirementBinding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Unique credential names, in insertion order
    pub fn names(&self) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        self.bindings
            .iter()
            .filter(|b| seen.insert(normalize_credential_name(&b.credential)))
            .map(|b| b.credential.as_str())
            .collect()
    }

    pub fn binding_ids(&self) -> Vec<&'a str> {
        self.bindings.iter().map(|b| b.id.as_str()).collect()
    }

    /// Whether a credential name is part of this set (normalized comparison)
    pub fn contains_name(&self, name: &str) -> bool {
        let wanted = normalize_credential_name(name);
        self.bindings
            .iter()
            .any(|b| normalize_credential_name(&b.credential) == wanted)
    }

    pub(crate) fn extend(&mut self, other: RequirementSet<'a>) {
        for binding in other.bindings {
            self.push(binding);
        }
    }
}

/// Direct lookup by logical stage id
///
/// Returns an empty set when the logical stage does not exist, is not
/// population-included or belongs to another tenant than the scope's.
pub fn resolve_direct<'a>(ctx: &ResolutionContext<'a>, logical_stage_id: &str) -> RequirementSet<'a> {
    let mut set = RequirementSet::default();
    let in_scope = ctx
        .snapshot()
        .logical_stage(logical_stage_id)
        .is_some_and(|l| is_logical_stage_in_scope(l, ctx.scope()));
    if !in_scope {
        tracing::debug!(logical_stage = %logical_stage_id, "logical stage out of scope, no requirements");
        return set;
    }

    for binding in ctx.snapshot().bindings() {
        if binding.requires_at(logical_stage_id) && ctx.scope().division.matches(&binding.division) {
            set.push(binding);
        }
    }
    set
}

/// Derived lookup by stage name (case-insensitive)
pub fn resolve_derived<'a>(ctx: &ResolutionContext<'a>, stage_name: &str) -> RequirementSet<'a> {
    let mut logical_ids: Vec<&str> = Vec::new();
    for record in ctx.visible_stages().filter(|s| s.name_matches(stage_name)) {
        if let Some(id) = record.logical_stage_id.as_deref() {
            if !logical_ids.contains(&id) {
                logical_ids.push(id);
            }
        }
    }

    let mut set = RequirementSet::default();
    for id in logical_ids {
        set.extend(resolve_direct(ctx, id));
    }
    set
}

/// Requirements of a concrete stage record, evaluated in its own division
pub fn resolve_for_stage<'a>(ctx: &ResolutionContext<'a>, stage: &StageRecord) -> RequirementSet<'a> {
    match stage.logical_stage_id.as_deref() {
        Some(id) => resolve_direct(&ctx.narrowed_to(&stage.division), id),
        None => RequirementSet::default(),
    }
}

//! Duplicate-binding guard
//!
//! Within a division a credential name is bound to at most one logical
//! stage. Binding it somewhere else first surfaces a [`BindingConflict`]
//! that the caller resolves with [`Resolution::Move`] or [`Resolution::Cancel`].

use serde::Serialize;

use crate::core::context::Snapshot;
use crate::core::error::EngineError;
use crate::entities::{RequirementBinding, StageRecord};

/// Case-fold, trim and collapse internal whitespace
pub fn normalize_credential_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Request to require a credential at a stage of one division
#[derive(Debug, Clone, PartialEq)]
pub struct BindRequest {
    pub credential: String,
    pub division: String,
    /// Stage name, matched case-insensitively among the division's active stages
    pub stage: String,
    pub description: Option<String>,
}

impl BindRequest {
    pub fn new(
        credential: impl Into<String>,
        division: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        Self {
            credential: credential.into(),
            division: division.into(),
            stage: stage.into(),
            description: None,
        }
    }
}

/// A credential already bound to another logical stage in the division
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingConflict {
    pub credential: String,
    pub division: String,
    /// Stage currently owning the binding
    pub from: String,
    /// Stage the caller asked to bind to
    pub to: String,
    pub binding_id: String,
    pub from_logical_stage_id: String,
    pub to_logical_stage_id: String,
}

impl std::fmt::Display for BindingConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' is already required at {} in division {} (requested: {})",
            self.credential, self.from, self.division, self.to
        )
    }
}

/// How the caller settles a binding conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Unbind from the old stage and bind to the new one
    Move,
    /// Leave everything as it is
    Cancel,
}

/// Result of a bind attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BindOutcome {
    /// The binding now points at the requested stage
    Bound { binding_id: String, created: bool },
    /// Nothing to do, the credential was already required there
    AlreadyBound { binding_id: String },
    /// Nothing changed, the caller must resolve the conflict
    Conflict(BindingConflict),
    /// The caller cancelled a conflict
    Cancelled,
}

/// Ids of bindings a guard operation changed
pub type ChangedBindings = Vec<String>;

fn target_stage<'a>(snapshot: &'a Snapshot, request: &BindRequest) -> Result<(&'a StageRecord, String), EngineError> {
    if request.credential.trim().is_empty() {
        return Err(EngineError::validation("credential name is required"));
    }
    let stage = snapshot
        .stages()
        .iter()
        .find(|s| s.is_active() && s.division == request.division && s.name_matches(&request.stage))
        .ok_or_else(|| EngineError::not_found("stage", format!("{} in division {}", request.stage, request.division)))?;
    let logical = stage
        .logical_stage_id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| EngineError::validation(format!("stage '{}' has no logical stage selected", stage.name)))?;
    Ok((stage, logical))
}

/// Name of the stage owning a logical stage within a division
fn stage_name_for(snapshot: &Snapshot, division: &str, logical_stage_id: &str) -> String {
    snapshot
        .stages()
        .iter()
        .find(|s| {
            s.is_active() && s.division == division && s.logical_stage_id.as_deref() == Some(logical_stage_id)
        })
        .map(|s| s.name.clone())
        .or_else(|| snapshot.logical_stage(logical_stage_id).map(|l| l.name.clone()))
        .unwrap_or_else(|| logical_stage_id.to_string())
}

fn same_credential(binding: &RequirementBinding, normalized: &str, division: &str) -> bool {
    !binding.deleted && binding.division == division && normalize_credential_name(&binding.credential) == normalized
}

/// Look for an existing binding of the same credential to a different logical stage
pub fn check_binding(snapshot: &Snapshot, request: &BindRequest) -> Result<Option<BindingConflict>, EngineError> {
    let (stage, logical) = target_stage(snapshot, request)?;
    let normalized = normalize_credential_name(&request.credential);

    let conflict = snapshot
        .bindings()
        .iter()
        .filter(|b| same_credential(b, &normalized, &request.division))
        .find(|b| b.is_bound() && b.logical_stage_id.as_deref() != Some(logical.as_str()))
        .map(|existing| {
            let from_logical = existing.logical_stage_id.clone().unwrap_or_default();
            BindingConflict {
                credential: existing.credential.clone(),
                division: request.division.clone(),
                from: stage_name_for(snapshot, &request.division, &from_logical),
                to: stage.name.clone(),
                binding_id: existing.id.clone(),
                from_logical_stage_id: from_logical,
                to_logical_stage_id: logical.clone(),
            }
        });
    Ok(conflict)
}

/// Bind a credential to a stage unless it is bound elsewhere in the division
pub fn bind(snapshot: &mut Snapshot, request: &BindRequest) -> Result<(BindOutcome, ChangedBindings), EngineError> {
    if let Some(conflict) = check_binding(snapshot, request)? {
        tracing::info!(%conflict, "binding conflict");
        return Ok((BindOutcome::Conflict(conflict), Vec::new()));
    }
    attach(snapshot, request)
}

/// Bind after a conflict was surfaced
pub fn bind_resolved(
    snapshot: &mut Snapshot,
    request: &BindRequest,
    resolution: Resolution,
) -> Result<(BindOutcome, ChangedBindings), EngineError> {
    match resolution {
        Resolution::Cancel => Ok((BindOutcome::Cancelled, Vec::new())),
        Resolution::Move => {
            let (_, logical) = target_stage(snapshot, request)?;
            let normalized = normalize_credential_name(&request.credential);
            let mut changed = Vec::new();
            for binding in snapshot.bindings_mut() {
                if same_credential(binding, &normalized, &request.division)
                    && binding.is_bound()
                    && binding.logical_stage_id.as_deref() != Some(logical.as_str())
                {
                    binding.unbind();
                    changed.push(binding.id.clone());
                }
            }
            let (outcome, attached) = attach(snapshot, request)?;
            for id in attached {
                if !changed.contains(&id) {
                    changed.push(id);
                }
            }
            Ok((outcome, changed))
        }
    }
}

/// Point a binding at the target stage, reusing an unbound record when one exists
fn attach(snapshot: &mut Snapshot, request: &BindRequest) -> Result<(BindOutcome, ChangedBindings), EngineError> {
    let (_, logical) = target_stage(snapshot, request)?;
    let normalized = normalize_credential_name(&request.credential);

    if let Some(existing) = snapshot
        .bindings()
        .iter()
        .find(|b| same_credential(b, &normalized, &request.division) && b.requires_at(&logical))
    {
        return Ok((
            BindOutcome::AlreadyBound {
                binding_id: existing.id.clone(),
            },
            Vec::new(),
        ));
    }

    let reusable = snapshot
        .bindings_mut()
        .iter_mut()
        .find(|b| same_credential(b, &normalized, &request.division) && !b.is_bound());
    if let Some(binding) = reusable {
        binding.logical_stage_id = Some(logical);
        if request.description.is_some() {
            binding.description = request.description.clone();
        }
        tracing::info!(credential = %binding.credential, division = %binding.division, "rebound credential");
        let id = binding.id.clone();
        return Ok((
            BindOutcome::Bound {
                binding_id: id.clone(),
                created: false,
            },
            vec![id],
        ));
    }

    let mut binding = RequirementBinding::new(request.credential.trim(), &request.division, logical);
    binding.id = ulid::Ulid::new().to_string();
    binding.description = request.description.clone();
    let id = binding.id.clone();
    tracing::info!(credential = %binding.credential, division = %binding.division, "created binding");
    snapshot.bindings_mut().push(binding);
    Ok((
        BindOutcome::Bound {
            binding_id: id.clone(),
            created: true,
        },
        vec![id],
    ))
}

/// Detach a credential from a stage of a division, keeping the records
///
/// Returns the ids of bindings that were unbound.
pub fn unbind(
    snapshot: &mut Snapshot,
    credential: &str,
    division: &str,
    stage: &str,
) -> Result<ChangedBindings, EngineError> {
    let (_, logical) = target_stage(snapshot, &BindRequest::new(credential, division, stage))?;
    let normalized = normalize_credential_name(credential);

    let mut changed = Vec::new();
    for binding in snapshot.bindings_mut() {
        if same_credential(binding, &normalized, division) && binding.requires_at(&logical) {
            binding.unbind();
            changed.push(binding.id.clone());
        }
    }
    if changed.is_empty() {
        return Err(EngineError::not_found(
            "binding",
            format!("{} at {} in division {}", credential, stage, division),
        ));
    }
    tracing::info!(credential, division, stage, count = changed.len(), "unbound credential");
    Ok(changed)
}

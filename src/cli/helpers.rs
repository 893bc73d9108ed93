//! Shared helper functions for CLI commands
//!
//! This module contains utility functions that are used across multiple
//! command modules to avoid code duplication.

use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{IntoDiagnostic, Result};
use std::io::{self, IsTerminal};

use crate::cli::GlobalOpts;
use crate::core::error::EngineError;
use crate::core::project::Project;
use crate::core::scope::Scope;
use crate::core::session::{EditSession, SaveReport};
use crate::core::Snapshot;
use crate::entities::{StageRecord, Subject};
use crate::store::FileStore;

/// An opened project with its store and the scope selected for this run
pub struct Workspace {
    pub project: Project,
    pub store: FileStore,
    pub scope: Scope,
}

impl Workspace {
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let project = Project::discover()?;
        let store = project.store();
        let scope = project
            .config()
            .scope(global.division.as_deref(), global.tenant.as_deref());
        tracing::debug!(%scope, "selected scope");
        Ok(Self {
            project,
            store,
            scope,
        })
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot::load(&self.store)?)
    }

    pub fn session(&self) -> Result<EditSession> {
        Ok(EditSession::load(&self.store)?)
    }

    /// The single division of the scope, or a scope error under ALL
    pub fn division(&self) -> Result<String> {
        Ok(self
            .scope
            .division
            .as_division()
            .map(str::to_string)
            .ok_or(EngineError::ScopeRequired)?)
    }

    /// Save a session and fail on any collection that did not persist
    pub fn save(&mut self, session: &mut EditSession) -> Result<SaveReport> {
        Ok(session.save(&mut self.store).into_result()?)
    }
}

/// Find a subject by id, or by a unique case-insensitive full name
pub fn find_subject<'a>(snapshot: &'a Snapshot, query: &str) -> Result<&'a Subject> {
    if let Some(subject) = snapshot.subject(query) {
        return Ok(subject);
    }
    let wanted = query.trim().to_lowercase();
    let matches: Vec<&Subject> = snapshot
        .subjects()
        .iter()
        .filter(|s| s.display_name().to_lowercase() == wanted)
        .collect();
    match matches.as_slice() {
        [one] => Ok(one),
        [] => Err(EngineError::not_found("subject", query).into()),
        many => Err(EngineError::validation(format!(
            "'{}' matches {} subjects, use an id",
            query,
            many.len()
        ))
        .into()),
    }
}

/// Find an active stage of a division by id or by name
pub fn find_stage<'a>(snapshot: &'a Snapshot, division: &str, query: &str) -> Result<&'a StageRecord> {
    if let Some(stage) = snapshot
        .stage(query)
        .filter(|s| s.is_active() && s.division == division)
    {
        return Ok(stage);
    }
    snapshot
        .stages()
        .iter()
        .find(|s| s.is_active() && s.division == division && s.name_matches(query))
        .ok_or_else(|| EngineError::not_found("stage", format!("{} in division {}", query, division)).into())
}

/// Ask a yes/no question; `assume_yes` skips the prompt
///
/// Without a terminal the answer is no.
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    if !io::stdin().is_terminal() {
        return Ok(false);
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .into_diagnostic()
}

/// Whether interactive prompts can be shown
pub fn is_interactive() -> bool {
    io::stdin().is_terminal() && io::stderr().is_terminal()
}

/// Convert a 1-based user position into a 0-based index
pub fn zero_based(position: u32) -> i64 {
    i64::from(position) - 1
}

/// Format an optional value for table output
pub fn or_dash(value: Option<impl std::fmt::Display>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

//! `olt advance` command - Auto-advance eligibility and recalculation

use clap::Subcommand;
use console::style;
use miette::{bail, Result};
use serde::Serialize;

use crate::cli::helpers::{find_stage, find_subject, or_dash, Workspace};
use crate::cli::output::{emit, is_structured, success, warning, Rows};
use crate::cli::GlobalOpts;
use crate::core::advance::{candidates, decide, next_stage, plan, recalculate, Recalculation};
use crate::core::context::ResolutionContext;

#[derive(Subcommand, Debug)]
pub enum AdvanceCommands {
    /// Whether a subject would auto-advance, and why
    Check(SubjectArgs),

    /// The stage after a subject's current one
    Next(SubjectArgs),

    /// Subjects ready to auto-advance
    Candidates,

    /// Advance every eligible subject of the division
    Apply(ApplyArgs),

    /// Turn auto-advance on or off for a stage
    Auto(AutoArgs),
}

#[derive(clap::Args, Debug)]
pub struct SubjectArgs {
    /// Subject id or full name
    pub subject: String,
}

#[derive(clap::Args, Debug)]
pub struct ApplyArgs {
    /// Show the plan without moving anyone
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct AutoArgs {
    /// Stage name or id (its logical stage is changed)
    pub stage: String,

    /// Turn auto-advance off instead of on
    #[arg(long)]
    pub off: bool,
}

#[derive(Debug, Serialize)]
struct NextView {
    subject_id: String,
    from: String,
    next: Option<String>,
    next_stage_id: Option<String>,
}

pub fn run(cmd: AdvanceCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        AdvanceCommands::Check(args) => run_check(args, global),
        AdvanceCommands::Next(args) => run_next(args, global),
        AdvanceCommands::Candidates => run_candidates(global),
        AdvanceCommands::Apply(args) => run_apply(args, global),
        AdvanceCommands::Auto(args) => run_auto(args, global),
    }
}

fn run_check(args: SubjectArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let snapshot = workspace.snapshot()?;
    let subject = find_subject(&snapshot, &args.subject)?;
    let ctx = ResolutionContext::new(&snapshot, workspace.scope.clone());
    let decision = decide(&ctx, subject);

    let mut rows = Rows::new(&["subject", "stage", "eligible", "next", "reason"]);
    rows.push([
        subject.display_name(),
        subject.stage_name.clone(),
        if decision.target().is_some() { "yes" } else { "no" }.to_string(),
        or_dash(decision.target().map(|t| t.name.as_str())),
        decision.describe(),
    ]);
    emit(&decision, &rows, global.output)
}

fn run_next(args: SubjectArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let snapshot = workspace.snapshot()?;
    let subject = find_subject(&snapshot, &args.subject)?;
    let ctx = ResolutionContext::new(&snapshot, workspace.scope.clone());
    let next = next_stage(&ctx, subject)?;

    let view = NextView {
        subject_id: subject.id.clone(),
        from: subject.stage_name.clone(),
        next: next.map(|s| s.name.clone()),
        next_stage_id: next.map(|s| s.id.clone()),
    };
    let mut rows = Rows::new(&["subject", "from", "next"]);
    rows.push([
        subject.display_name(),
        view.from.clone(),
        or_dash(view.next.as_deref()),
    ]);
    emit(&view, &rows, global.output)
}

fn run_candidates(global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let snapshot = workspace.snapshot()?;
    let ctx = ResolutionContext::new(&snapshot, workspace.scope.clone());
    let found = candidates(&ctx);

    if found.is_empty() {
        eprintln!("No subjects ready to advance in {}.", workspace.scope);
        return Ok(());
    }
    let mut rows = Rows::new(&["id", "subject", "division", "from", "to"]);
    for c in &found {
        rows.push([
            c.subject_id.clone(),
            c.subject.clone(),
            c.division.clone(),
            c.from.clone(),
            c.to.clone(),
        ]);
    }
    emit(&found, &rows, global.output)
}

fn run_apply(args: ApplyArgs, global: &GlobalOpts) -> Result<()> {
    let mut workspace = Workspace::open(global)?;
    workspace.division()?;
    let mut snapshot = workspace.snapshot()?;

    let report = if args.dry_run {
        Recalculation {
            results: plan(&ResolutionContext::new(&snapshot, workspace.scope.clone())),
            failures: Vec::new(),
        }
    } else {
        recalculate(&mut snapshot, &workspace.scope, &mut workspace.store)?
    };

    let mut rows = Rows::new(&["id", "subject", "from", "to", "changed", "reason"]);
    for r in &report.results {
        rows.push([
            r.subject_id.clone(),
            r.subject.clone(),
            r.from.clone(),
            or_dash(r.to.as_deref()),
            if r.changed { "yes" } else { "no" }.to_string(),
            r.reason.clone(),
        ]);
    }
    if is_structured(global.output) {
        emit(&report, &rows, global.output)?;
    } else {
        emit(&report.results, &rows, global.output)?;
    }

    if args.dry_run {
        return Ok(());
    }
    let summary = format!("Advanced {} of {} subject(s)", report.moved(), report.results.len());
    if !report.is_complete() {
        for failure in &report.failures {
            warning(format!("{}: {}", failure.stage, failure.error));
        }
        bail!("{}, {} group(s) failed to save", summary, report.failures.len());
    }
    success(global.output, summary);
    Ok(())
}

fn run_auto(args: AutoArgs, global: &GlobalOpts) -> Result<()> {
    let mut workspace = Workspace::open(global)?;
    let division = workspace.division()?;
    let mut session = workspace.session()?;

    let stage = find_stage(session.snapshot(), &division, &args.stage)?;
    let name = stage.name.clone();
    let logical = stage.logical_stage_id.clone().unwrap_or_default();
    let enabled = !args.off;

    let changed = session.set_auto_advance(&logical, enabled)?;
    workspace.save(&mut session)?;
    let state = if enabled { "on" } else { "off" };
    if changed {
        success(global.output, format!("Auto-advance {} for {}", state, style(&name).cyan()));
    } else {
        success(global.output, format!("Auto-advance already {} for {}", state, name));
    }
    Ok(())
}

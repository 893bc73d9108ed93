//! `olt compliance` command - Credential compliance views

use clap::Subcommand;
use console::style;
use miette::{bail, Result};
use serde::Serialize;

use crate::cli::helpers::{find_subject, or_dash, Workspace};
use crate::cli::output::{emit, is_structured, Rows};
use crate::cli::GlobalOpts;
use crate::core::compliance::{
    cumulative_missing, evaluate_subject, summary_with_fallback, validate_stage_population,
};
use crate::core::context::ResolutionContext;
use crate::core::history::{days_in_stage, is_overdue};
use crate::core::report::{bottlenecks, stage_report};
use crate::core::workflow::resolve_workflow;

#[derive(Subcommand, Debug)]
pub enum ComplianceCommands {
    /// A subject's standing against their current stage
    Subject(SubjectArgs),

    /// Aggregate slot compliance of the scope
    Summary,

    /// Per-stage compliance report
    Report(ReportArgs),

    /// Subjects failing cumulative requirements, per stage
    Validate(ValidateArgs),
}

#[derive(clap::Args, Debug)]
pub struct SubjectArgs {
    /// Subject id or full name
    pub subject: String,
}

#[derive(clap::Args, Debug)]
pub struct ReportArgs {
    /// Only occupied stages, least compliant first
    #[arg(long, short = 'b')]
    pub bottlenecks: bool,
}

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Exit with an error when any subject fails
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Serialize)]
struct SubjectView {
    subject_id: String,
    subject: String,
    division: String,
    stage: String,
    days_in_stage: Option<i64>,
    overdue: bool,
    complete: bool,
    requirements: Vec<RequirementView>,
    missing_from_earlier_stages: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RequirementView {
    credential: String,
    status: String,
    expires_at: Option<String>,
}

pub fn run(cmd: ComplianceCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ComplianceCommands::Subject(args) => run_subject(args, global),
        ComplianceCommands::Summary => run_summary(global),
        ComplianceCommands::Report(args) => run_report(args, global),
        ComplianceCommands::Validate(args) => run_validate(args, global),
    }
}

fn run_subject(args: SubjectArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let snapshot = workspace.snapshot()?;
    let subject = find_subject(&snapshot, &args.subject)?;
    let ctx = ResolutionContext::new(&snapshot, workspace.scope.clone()).narrowed_to(&subject.division);

    let compliance = evaluate_subject(&ctx, subject);
    let workflow = resolve_workflow(&ctx);
    let current: Vec<&str> = compliance.statuses.iter().map(|s| s.binding.id.as_str()).collect();
    let earlier_missing = cumulative_missing(&ctx, &workflow, subject)
        .into_iter()
        .filter(|b| !current.contains(&b.id.as_str()))
        .map(|b| b.credential.clone())
        .collect();
    let days = days_in_stage(&snapshot, subject, ctx.now());

    let view = SubjectView {
        subject_id: subject.id.clone(),
        subject: subject.display_name(),
        division: subject.division.clone(),
        stage: subject.stage_name.clone(),
        days_in_stage: days,
        overdue: is_overdue(days),
        complete: compliance.is_complete(),
        requirements: compliance
            .statuses
            .iter()
            .map(|s| RequirementView {
                credential: s.binding.credential.clone(),
                status: s.fulfillment.to_string(),
                expires_at: s
                    .credential
                    .and_then(|c| c.expires_at)
                    .map(|at| at.format("%Y-%m-%d").to_string()),
            })
            .collect(),
        missing_from_earlier_stages: earlier_missing,
    };

    if !is_structured(global.output) {
        let days_text = match view.days_in_stage {
            Some(d) if view.overdue => style(format!("{} days (overdue)", d)).red().to_string(),
            Some(d) => format!("{} days", d),
            None => "-".to_string(),
        };
        eprintln!(
            "{} {} at {} in {}, {}",
            style(&view.subject).bold(),
            style(&view.subject_id).dim(),
            style(&view.stage).cyan(),
            view.division,
            days_text
        );
        if !view.missing_from_earlier_stages.is_empty() {
            eprintln!(
                "{} missing from earlier stages: {}",
                style("!").yellow(),
                view.missing_from_earlier_stages.join(", ")
            );
        }
    }

    let mut rows = Rows::new(&["credential", "status", "expires"]);
    for r in &view.requirements {
        rows.push([r.credential.clone(), r.status.clone(), or_dash(r.expires_at.as_deref())]);
    }
    emit(&view, &rows, global.output)
}

fn run_summary(global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let snapshot = workspace.snapshot()?;
    let ctx = ResolutionContext::new(&snapshot, workspace.scope.clone());
    let summary = summary_with_fallback(Some(&workspace.store), &ctx);

    let mut rows = Rows::new(&["scope", "fulfilled", "required", "percent"]);
    rows.push([
        workspace.scope.to_string(),
        summary.fulfilled_slots.to_string(),
        summary.total_required_slots.to_string(),
        format!("{}%", summary.percent),
    ]);
    emit(&summary, &rows, global.output)
}

fn run_report(args: ReportArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let snapshot = workspace.snapshot()?;
    let ctx = ResolutionContext::new(&snapshot, workspace.scope.clone());
    let reports = stage_report(&ctx);
    let selected: Vec<_> = if args.bottlenecks {
        bottlenecks(&reports)
    } else {
        reports.iter().collect()
    };

    let mut rows = Rows::new(&["stage", "subjects", "compliant", "ratio", "coverage"]);
    for r in &selected {
        let coverage = r
            .coverage
            .iter()
            .map(|c| format!("{} {}/{}", c.credential, c.holders, r.subjects))
            .collect::<Vec<_>>()
            .join(", ");
        rows.push([
            r.stage.clone(),
            r.subjects.to_string(),
            r.compliant.to_string(),
            format!("{:.0}%", r.ratio() * 100.0),
            if coverage.is_empty() { "-".to_string() } else { coverage },
        ]);
    }
    emit(&selected, &rows, global.output)
}

fn run_validate(args: ValidateArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let snapshot = workspace.snapshot()?;
    let ctx = ResolutionContext::new(&snapshot, workspace.scope.clone());
    let results = validate_stage_population(&ctx);

    let mut rows = Rows::new(&["stage", "subjects", "failing"]);
    for r in &results {
        rows.push([r.stage.clone(), r.subjects.to_string(), r.failing.to_string()]);
    }
    emit(&results, &rows, global.output)?;

    let failing: usize = results.iter().map(|r| r.failing).sum();
    if args.strict && failing > 0 {
        bail!("{} subject(s) are missing credentials required by earlier stages", failing);
    }
    Ok(())
}

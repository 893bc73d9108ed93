//! `olt cert` command - Credential requirement bindings

use clap::Subcommand;
use console::style;
use dialoguer::{theme::ColorfulTheme, Select};
use miette::{bail, IntoDiagnostic, Result};
use serde::Serialize;

use crate::cli::helpers::{find_stage, is_interactive, or_dash, Workspace};
use crate::cli::output::{emit, success, warning, Rows};
use crate::cli::GlobalOpts;
use crate::core::binding::{BindOutcome, BindRequest, BindingConflict, Resolution};
use crate::core::context::ResolutionContext;
use crate::core::requirements::resolve_for_stage;
use crate::core::Snapshot;

#[derive(Subcommand, Debug)]
pub enum CertCommands {
    /// Require a credential at a stage
    Bind(BindArgs),

    /// Stop requiring a credential at a stage
    Unbind(UnbindArgs),

    /// List credential requirements
    List(ListArgs),
}

#[derive(clap::Args, Debug)]
pub struct BindArgs {
    /// Credential name (e.g. "CPR")
    pub credential: String,

    /// Stage name
    #[arg(long, short = 's')]
    pub stage: String,

    /// Description for a newly created requirement
    #[arg(long)]
    pub description: Option<String>,

    /// If already required at another stage, move it here
    #[arg(long = "move", conflicts_with = "keep")]
    pub move_existing: bool,

    /// If already required at another stage, leave it there
    #[arg(long)]
    pub keep: bool,
}

#[derive(clap::Args, Debug)]
pub struct UnbindArgs {
    /// Credential name
    pub credential: String,

    /// Stage name
    #[arg(long, short = 's')]
    pub stage: String,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Only the requirements of this stage
    #[arg(long, short = 's')]
    pub stage: Option<String>,
}

#[derive(Debug, Serialize)]
struct BindingRow {
    credential: String,
    stage: Option<String>,
    division: String,
    binding_id: String,
}

pub fn run(cmd: CertCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        CertCommands::Bind(args) => run_bind(args, global),
        CertCommands::Unbind(args) => run_unbind(args, global),
        CertCommands::List(args) => run_list(args, global),
    }
}

fn run_bind(args: BindArgs, global: &GlobalOpts) -> Result<()> {
    let mut workspace = Workspace::open(global)?;
    let division = workspace.division()?;
    let mut session = workspace.session()?;

    let mut request = BindRequest::new(&args.credential, &division, &args.stage);
    request.description = args.description.clone();

    let mut outcome = session.bind(&request)?;
    if let BindOutcome::Conflict(conflict) = &outcome {
        let resolution = choose_resolution(conflict, &args)?;
        outcome = session.resolve_conflict(&request, resolution)?;
    }

    // outcomes without a conflict still persist orders repaired on load
    if !matches!(outcome, BindOutcome::Conflict(_)) {
        workspace.save(&mut session)?;
    }

    match &outcome {
        BindOutcome::Bound { created, .. } => {
            let verb = if *created { "Created" } else { "Bound" };
            success(
                global.output,
                format!(
                    "{} requirement {} at {} in {}",
                    verb,
                    style(&args.credential).cyan(),
                    args.stage,
                    division
                ),
            );
        }
        BindOutcome::AlreadyBound { .. } => {
            success(
                global.output,
                format!("{} is already required at {}", args.credential, args.stage),
            );
        }
        BindOutcome::Cancelled => warning("Kept the existing requirement, nothing changed"),
        BindOutcome::Conflict(conflict) => bail!("{}", conflict),
    }

    if crate::cli::output::is_structured(global.output) {
        emit(&outcome, &Rows::default(), global.output)?;
    }
    Ok(())
}

fn choose_resolution(conflict: &BindingConflict, args: &BindArgs) -> Result<Resolution> {
    if args.move_existing {
        return Ok(Resolution::Move);
    }
    if args.keep {
        return Ok(Resolution::Cancel);
    }
    if !is_interactive() {
        bail!("{} - pass --move to move it or --keep to leave it", conflict);
    }

    warning(conflict);
    let choices = [
        format!("Move it to {}", conflict.to),
        format!("Keep it at {}", conflict.from),
    ];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Resolve duplicate requirement")
        .items(&choices)
        .default(1)
        .interact()
        .into_diagnostic()?;
    Ok(if selection == 0 {
        Resolution::Move
    } else {
        Resolution::Cancel
    })
}

fn run_unbind(args: UnbindArgs, global: &GlobalOpts) -> Result<()> {
    let mut workspace = Workspace::open(global)?;
    let division = workspace.division()?;
    let mut session = workspace.session()?;

    let count = session.unbind(&args.credential, &division, &args.stage)?;
    workspace.save(&mut session)?;
    success(
        global.output,
        format!(
            "{} no longer required at {} ({} binding{})",
            style(&args.credential).cyan(),
            args.stage,
            count,
            if count == 1 { "" } else { "s" }
        ),
    );
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let snapshot = workspace.snapshot()?;
    let ctx = ResolutionContext::new(&snapshot, workspace.scope.clone());

    let bindings: Vec<BindingRow> = match &args.stage {
        Some(stage) => {
            let division = workspace.division()?;
            let stage = find_stage(&snapshot, &division, stage)?;
            resolve_for_stage(&ctx, stage)
                .bindings()
                .iter()
                .map(|b| BindingRow {
                    credential: b.credential.clone(),
                    stage: Some(stage.name.clone()),
                    division: b.division.clone(),
                    binding_id: b.id.clone(),
                })
                .collect()
        }
        None => snapshot
            .bindings()
            .iter()
            .filter(|b| !b.deleted && ctx.scope().division.matches(&b.division))
            .map(|b| BindingRow {
                credential: b.credential.clone(),
                stage: stage_for(&snapshot, &b.division, b.logical_stage_id.as_deref()),
                division: b.division.clone(),
                binding_id: b.id.clone(),
            })
            .collect(),
    };

    if bindings.is_empty() {
        eprintln!("No credential requirements found.");
        return Ok(());
    }

    let mut rows = Rows::new(&["credential", "stage", "division", "id"]);
    for b in &bindings {
        rows.push([
            b.credential.clone(),
            or_dash(b.stage.as_deref()),
            b.division.clone(),
            b.binding_id.clone(),
        ]);
    }
    emit(&bindings, &rows, global.output)
}

/// Name of the active stage of a division backed by a logical stage
fn stage_for(snapshot: &Snapshot, division: &str, logical_stage_id: Option<&str>) -> Option<String> {
    let logical = logical_stage_id.filter(|id| !id.is_empty())?;
    snapshot
        .stages()
        .iter()
        .find(|s| s.is_active() && s.division == division && s.logical_stage_id.as_deref() == Some(logical))
        .map(|s| s.name.clone())
}

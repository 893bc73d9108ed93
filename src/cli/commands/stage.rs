//! `olt stage` command - Edit the stage order of a division

use clap::{Subcommand, ValueEnum};
use console::style;
use miette::Result;
use serde::Serialize;

use crate::cli::helpers::{confirm, find_stage, zero_based, Workspace};
use crate::cli::output::{emit, is_structured, success, warning, Rows};
use crate::cli::GlobalOpts;
use crate::core::ordering::{division_orders, Direction, InsertRequest};
use crate::core::Snapshot;

#[derive(Subcommand, Debug)]
pub enum StageCommands {
    /// Insert a stage (or restore a deleted one of the same name)
    Insert(InsertArgs),

    /// Soft-delete a stage and close the gap
    Delete(DeleteArgs),

    /// Swap a stage with its neighbour
    Swap(SwapArgs),

    /// Move a stage to another position
    Move(MoveArgs),
}

#[derive(clap::Args, Debug)]
pub struct InsertArgs {
    /// Stage name
    pub name: String,

    /// 1-based position in the division's workflow
    #[arg(long, short = 'p')]
    pub position: u32,

    /// Logical stage id (or name) the stage represents
    #[arg(long, short = 'l')]
    pub logical: String,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Stage name or id
    pub stage: String,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DirectionArg {
    Up,
    Down,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Up => Direction::Up,
            DirectionArg::Down => Direction::Down,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct SwapArgs {
    /// 1-based position of the stage in the workflow
    pub position: u32,

    /// Neighbour to swap with
    #[arg(value_enum)]
    pub direction: DirectionArg,
}

#[derive(clap::Args, Debug)]
pub struct MoveArgs {
    /// 1-based position of the stage to move
    pub from: u32,

    /// 1-based position the stage should end up at
    pub to: u32,
}

#[derive(Debug, Serialize)]
struct OrderReport<'a> {
    division: &'a str,
    changed: &'a [String],
    orders: Vec<u32>,
}

pub fn run(cmd: StageCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        StageCommands::Insert(args) => run_insert(args, global),
        StageCommands::Delete(args) => run_delete(args, global),
        StageCommands::Swap(args) => run_swap(args, global),
        StageCommands::Move(args) => run_move(args, global),
    }
}

fn run_insert(args: InsertArgs, global: &GlobalOpts) -> Result<()> {
    let mut workspace = Workspace::open(global)?;
    let division = workspace.division()?;
    let mut session = workspace.session()?;

    let logical_stage_id = resolve_logical(session.snapshot(), &args.logical);
    let request = InsertRequest::new(&division, &args.name, args.position, logical_stage_id);
    let inserted = session.insert_stage(&request)?;
    workspace.save(&mut session)?;

    let verb = if inserted.restored { "Restored" } else { "Inserted" };
    success(
        global.output,
        format!(
            "{} {} at position {} in {}",
            verb,
            style(&args.name).cyan(),
            args.position,
            division
        ),
    );
    print_change(session.snapshot(), &division, &inserted.change.changed, global)
}

fn run_delete(args: DeleteArgs, global: &GlobalOpts) -> Result<()> {
    let mut workspace = Workspace::open(global)?;
    let division = workspace.division()?;
    let mut session = workspace.session()?;

    let stage = find_stage(session.snapshot(), &division, &args.stage)?;
    let (stage_id, name) = (stage.id.clone(), stage.name.clone());
    if !confirm(&format!("Delete stage '{}' from {}?", name, division), args.yes)? {
        warning("Cancelled, nothing deleted (pass --yes to skip the prompt)");
        return Ok(());
    }

    let change = session.delete_stage(&stage_id)?;
    workspace.save(&mut session)?;
    success(global.output, format!("Deleted {} from {}", style(&name).cyan(), division));
    print_change(session.snapshot(), &division, &change.changed, global)
}

fn run_swap(args: SwapArgs, global: &GlobalOpts) -> Result<()> {
    let mut workspace = Workspace::open(global)?;
    let division = workspace.division()?;
    let mut session = workspace.session()?;

    let change = session.swap(&workspace.scope, zero_based(args.position), args.direction.into())?;
    workspace.save(&mut session)?;
    let neighbour = match args.direction {
        DirectionArg::Up => args.position.saturating_sub(1),
        DirectionArg::Down => args.position + 1,
    };
    success(
        global.output,
        format!("Swapped positions {} and {}", args.position, neighbour),
    );
    print_change(session.snapshot(), &division, &change.changed, global)
}

fn run_move(args: MoveArgs, global: &GlobalOpts) -> Result<()> {
    let mut workspace = Workspace::open(global)?;
    let division = workspace.division()?;
    let mut session = workspace.session()?;

    let from = zero_based(args.from);
    let target = zero_based(args.to);
    // drop slots address the gaps between entries
    let drop = if target > from { target + 1 } else { target };
    let change = session.drag_move(&workspace.scope, from, drop)?;
    workspace.save(&mut session)?;
    success(
        global.output,
        format!("Moved position {} to {}", args.from, args.to),
    );
    print_change(session.snapshot(), &division, &change.changed, global)
}

/// A logical stage given by id, or by a case-insensitive name
fn resolve_logical(snapshot: &Snapshot, query: &str) -> String {
    if snapshot.logical_stage(query).is_some() {
        return query.to_string();
    }
    snapshot
        .logical_stages()
        .iter()
        .find(|l| l.name.trim().eq_ignore_ascii_case(query.trim()))
        .map_or_else(|| query.to_string(), |l| l.id.clone())
}

fn print_change(snapshot: &Snapshot, division: &str, changed: &[String], global: &GlobalOpts) -> Result<()> {
    let report = OrderReport {
        division,
        changed,
        orders: division_orders(snapshot, division),
    };
    if is_structured(global.output) {
        return emit(&report, &Rows::default(), global.output);
    }

    let mut rows = Rows::new(&["stage", "order", "changed"]);
    let mut active: Vec<_> = snapshot
        .stages()
        .iter()
        .filter(|s| s.is_active() && s.division == division)
        .collect();
    active.sort_by_key(|s| s.order_index());
    for stage in active {
        let mark = if changed.contains(&stage.id) { "*" } else { "" };
        rows.push([stage.name.clone(), stage.order.clone(), mark.to_string()]);
    }
    emit(&report, &rows, global.output)
}

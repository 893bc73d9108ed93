//! `olt workflow` command - Show the resolved workflow

use miette::Result;
use serde::Serialize;

use crate::cli::helpers::{or_dash, Workspace};
use crate::cli::output::{emit, Rows};
use crate::cli::GlobalOpts;
use crate::core::context::ResolutionContext;
use crate::core::report::stage_distribution;
use crate::core::requirements::resolve_direct;
use crate::core::workflow::resolve_workflow;

#[derive(clap::Args, Debug)]
pub struct WorkflowArgs {
    /// Include the number of subjects currently at each stage
    #[arg(long, short = 'c')]
    pub counts: bool,
}

#[derive(Debug, Serialize)]
struct StepRow {
    position: usize,
    stage: String,
    stage_id: String,
    division: String,
    order: u32,
    logical_stage: String,
    auto_advance: bool,
    requires: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subjects: Option<usize>,
}

pub fn run(args: WorkflowArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let snapshot = workspace.snapshot()?;
    let ctx = ResolutionContext::new(&snapshot, workspace.scope.clone());
    let workflow = resolve_workflow(&ctx);
    let distribution = args.counts.then(|| stage_distribution(&ctx));

    let steps: Vec<StepRow> = workflow
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let logical = snapshot.logical_stage(step.logical_stage_id);
            StepRow {
                position: i + 1,
                stage: step.name.to_string(),
                stage_id: step.stage_id().to_string(),
                division: step.division().to_string(),
                order: step.order,
                logical_stage: logical.map_or_else(|| step.logical_stage_id.to_string(), |l| l.name.clone()),
                auto_advance: logical.is_some_and(|l| l.auto_advance),
                requires: resolve_direct(&ctx, step.logical_stage_id)
                    .names()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                subjects: distribution.as_ref().and_then(|d| d.stages.get(i)).map(|c| c.subjects),
            }
        })
        .collect();

    let mut headers = vec!["#", "stage", "division", "order", "logical stage", "auto", "requires"];
    if args.counts {
        headers.push("subjects");
    }
    let mut rows = Rows::new(&headers);
    for step in &steps {
        let mut cells = vec![
            step.position.to_string(),
            step.stage.clone(),
            step.division.clone(),
            step.order.to_string(),
            step.logical_stage.clone(),
            if step.auto_advance { "yes" } else { "no" }.to_string(),
            if step.requires.is_empty() {
                "-".to_string()
            } else {
                step.requires.join(", ")
            },
        ];
        if args.counts {
            cells.push(or_dash(step.subjects));
        }
        rows.push(cells);
    }

    if steps.is_empty() {
        eprintln!("No stages in {}.", workspace.scope);
        return Ok(());
    }
    emit(&steps, &rows, global.output)
}

//! Command-line arguments

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::cli::commands::{
    advance::AdvanceCommands, cert::CertCommands, compliance::ComplianceCommands, init::InitArgs,
    stage::StageCommands, workflow::WorkflowArgs,
};

#[derive(Parser, Debug)]
#[command(name = "olt")]
#[command(author, version, about = "Operator Lifecycle Toolkit")]
#[command(long_about = "Resolve division workflows, credential requirements, compliance \
                        and auto-advance from plain-text record collections.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Division to work in ("all" spans every division)
    #[arg(long, short = 'd', global = true, env = "OLT_DIVISION")]
    pub division: Option<String>,

    /// Restrict logical stages to one tenant
    #[arg(long, global = true, env = "OLT_TENANT")]
    pub tenant: Option<String>,

    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value_t = OutputFormat::Auto)]
    pub output: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new project in the current directory
    Init(InitArgs),

    /// Show the resolved workflow of a division
    Workflow(WorkflowArgs),

    /// Reorder, insert and delete workflow stages
    #[command(subcommand)]
    Stage(StageCommands),

    /// Bind credential requirements to stages
    #[command(subcommand)]
    Cert(CertCommands),

    /// Evaluate credential compliance
    #[command(subcommand)]
    Compliance(ComplianceCommands),

    /// Auto-advance eligibility and bulk recalculation
    #[command(subcommand)]
    Advance(AdvanceCommands),
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Table on a terminal, TSV when piped
    #[default]
    Auto,
    /// Bordered table
    Table,
    /// Tab-separated values
    Tsv,
    /// Comma-separated values
    Csv,
    /// JSON
    Json,
    /// YAML
    Yaml,
}

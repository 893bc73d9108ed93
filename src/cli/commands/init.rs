//! `olt init` command - Create a project in the current directory

use clap::ValueEnum;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::GlobalOpts;
use crate::core::config::ConfigLayer;
use crate::core::project::Project;
use crate::store::DataFormat;

/// Encoding of collection files
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Yaml,
    Json,
}

impl From<FormatArg> for DataFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Yaml => DataFormat::Yaml,
            FormatArg::Json => DataFormat::Json,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Encoding of the collection files
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Data directory relative to the project root
    #[arg(long)]
    pub data_dir: Option<String>,
}

pub fn run(args: InitArgs, global: &GlobalOpts) -> Result<()> {
    let root = std::env::current_dir().into_diagnostic()?;
    let layer = ConfigLayer {
        data_dir: args.data_dir,
        format: args.format.map(DataFormat::from),
        default_division: global.division.clone(),
        default_tenant: global.tenant.clone(),
        log_level: None,
    };
    let project = Project::init(&root, layer)?;

    println!(
        "{} Initialized olt project in {}",
        style("✓").green(),
        style(project.root().display()).cyan()
    );
    println!(
        "   Collections: {} ({})",
        project.data_dir().display(),
        project.format()
    );
    Ok(())
}

use clap::Parser;
use miette::Result;
use olt::cli::{Cli, Commands};
use olt::core::{Config, Project};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Install miette's fancy error handler for beautiful diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let global = &cli.global;
    match cli.command {
        Commands::Init(args) => olt::cli::commands::init::run(args, global),
        Commands::Workflow(args) => olt::cli::commands::workflow::run(args, global),
        Commands::Stage(cmd) => olt::cli::commands::stage::run(cmd, global),
        Commands::Cert(cmd) => olt::cli::commands::cert::run(cmd, global),
        Commands::Compliance(cmd) => olt::cli::commands::compliance::run(cmd, global),
        Commands::Advance(cmd) => olt::cli::commands::advance::run(cmd, global),
    }
}

/// OLT_LOG wins; otherwise -v raises the configured level
fn init_logging(verbose: u8) {
    let filter = match EnvFilter::try_from_env("OLT_LOG") {
        Ok(filter) => filter,
        Err(_) => {
            let level = match verbose {
                0 => configured_level(),
                1 => "info".to_string(),
                2 => "debug".to_string(),
                _ => "trace".to_string(),
            };
            EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"))
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn configured_level() -> String {
    Project::discover()
        .map(|p| p.config().log_level.clone())
        .or_else(|_| Config::load(None).map(|c| c.log_level))
        .unwrap_or_else(|_| Config::default().log_level)
}

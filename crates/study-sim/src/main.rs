use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    expand::{self, ExpandArgs},
    registry::{self, RegistryArgs},
    run::{self, RunArgs},
    status::{self, StatusArgs},
};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "study-sim", about = "Variant simulation study runner")]
struct Cli {
    /// Raise the default log level to debug.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a study file.
    Run(RunArgs),
    /// Print the expanded variants of a study file without running them.
    Expand(ExpandArgs),
    /// Print the per-variant status of a study directory.
    Status(StatusArgs),
    /// Append to or query the study registry.
    Registry(RegistryArgs),
}

/// Logs go to stderr so stdout stays machine readable. `RUST_LOG`
/// overrides the default filter.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!(
            "warn,study_exp={level},study_solver={level},study_model={level},study_sim={level}"
        ))
    });
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Command::Run(args) => run::run(&args),
        Command::Expand(args) => expand::run(&args),
        Command::Status(args) => status::run(&args),
        Command::Registry(args) => registry::run(&args),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

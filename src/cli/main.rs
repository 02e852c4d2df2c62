//! dnorm - normalize flat CSV files into relational tables and report on them

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

mod commands;
mod logging;
mod output;

use crate::commands::AppContext;
use crate::commands::ingest::{IngestArgs, run_ingest};
use crate::commands::report::{ReportArgs, SuggestArgs, run_report, run_suggest};
use crate::commands::settings::{ConfigCommand, run_config};
use crate::commands::tables::{DeleteArgs, ShowArgs, run_delete, run_show, run_tables};
use crate::logging::{LogConfig, LogFormat, init_logging};

#[derive(Parser)]
#[command(
    name = "dnorm",
    version,
    about = "Normalize flat CSV files into relational tables and query them",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file
    #[arg(long, value_name = "PATH", default_value = "dnorm.toml", global = true)]
    config: PathBuf,

    /// Storage directory (overrides storage_dir from the config file)
    #[arg(long, value_name = "DIR", global = true)]
    storage_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize a CSV file into tables
    Ingest(IngestArgs),
    /// List stored tables
    Tables,
    /// Print the rows of a stored table
    Show(ShowArgs),
    /// Delete a stored table
    Delete(DeleteArgs),
    /// Run a report over stored tables
    Report(ReportArgs),
    /// Ask the analyst for report ideas
    Suggest(SuggestArgs),
    /// Inspect or change settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_verbosity(cli.verbose).with_format(cli.log_format);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = AppContext::open(&cli.config, cli.storage_dir.clone())?;

    match &cli.command {
        Command::Ingest(args) => run_ingest(&ctx, args).await,
        Command::Tables => run_tables(&ctx).await,
        Command::Show(args) => run_show(&ctx, args).await,
        Command::Delete(args) => run_delete(&ctx, args).await,
        Command::Report(args) => run_report(&ctx, args).await,
        Command::Suggest(args) => run_suggest(&ctx, args).await,
        Command::Config(command) => run_config(&ctx, &cli.config, command).await,
    }
}

//! `dnorm config`

use std::path::Path;

use anyhow::{Context, bail};
use clap::{Args, Subcommand};
use data_normalization_sdk::SdkConfig;
use data_normalization_sdk::pipeline::{LAST_RUN_CONFIG, RunReport};

use super::AppContext;
use crate::output::format_run_report;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init(InitArgs),
    /// Store the model API key in the storage directory
    SetApiKey(SetApiKeyArgs),
    /// Print the report of the last ingest run
    LastRun(LastRunArgs),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct SetApiKeyArgs {
    /// API key
    pub key: String,
}

#[derive(Args, Debug)]
pub struct LastRunArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run_config(
    ctx: &AppContext,
    config_path: &Path,
    command: &ConfigCommand,
) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Show => {
            print!("{}", ctx.config.to_toml_string()?);
        }
        ConfigCommand::Init(args) => {
            if config_path.exists() && !args.force {
                bail!(
                    "{} already exists; pass --force to overwrite",
                    config_path.display()
                );
            }
            let content = SdkConfig::default().to_toml_string()?;
            std::fs::write(config_path, content)
                .with_context(|| format!("writing {}", config_path.display()))?;
            println!("Wrote {}", config_path.display());
        }
        ConfigCommand::SetApiKey(args) => {
            let key = args.key.trim();
            if key.is_empty() {
                bail!("API key is empty");
            }
            ctx.storage.save_api_key(key).await?;
            println!("API key saved");
        }
        ConfigCommand::LastRun(args) => {
            let Some(value) = ctx.storage.load_config(LAST_RUN_CONFIG).await? else {
                println!("No run recorded yet.");
                return Ok(());
            };
            if args.json {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                let report: RunReport =
                    serde_json::from_value(value).context("reading last run report")?;
                print!("{}", format_run_report(&report));
            }
        }
    }
    Ok(())
}

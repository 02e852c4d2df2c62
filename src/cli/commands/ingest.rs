//! `dnorm ingest`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, ValueEnum};
use data_normalization_sdk::llm::SchemaArchitect;
use data_normalization_sdk::pipeline::{IngestMode, PipelineExecutor};
use data_normalization_sdk::source::CsvRowSource;
use data_normalization_sdk::SchemaPlan;
use tracing::info;

use super::{AppContext, read_document};
use crate::output::format_run_report;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    Append,
    Replace,
}

impl From<ModeArg> for IngestMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Append => IngestMode::Append,
            ModeArg::Replace => IngestMode::Replace,
        }
    }
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// CSV file to ingest
    pub file: PathBuf,

    /// Schema plan file (JSON or YAML); the configured model proposes one otherwise
    #[arg(long, value_name = "PATH")]
    pub plan: Option<PathBuf>,

    /// Store the rows as this single table when no plan can be obtained
    #[arg(long, value_name = "NAME")]
    pub table: Option<String>,

    /// How existing tables are treated
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Field delimiter
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,

    /// Rows read to infer headers
    #[arg(long, value_name = "N")]
    pub preview_rows: Option<usize>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run_ingest(ctx: &AppContext, args: &IngestArgs) -> anyhow::Result<()> {
    if !args.delimiter.is_ascii() {
        bail!("delimiter must be a single ASCII character");
    }
    if !args.file.exists() {
        bail!("file not found: {}", args.file.display());
    }

    let mut config = ctx.config.pipeline.clone();
    if let Some(mode) = args.mode {
        config = config.with_ingest_mode(mode.into());
    }
    if let Some(table) = &args.table {
        config = config.with_fallback_table(table.clone());
    }
    if let Some(rows) = args.preview_rows {
        config = config.with_preview_rows(rows);
    }

    let mut executor = PipelineExecutor::new(config, ctx.storage.clone())
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    if let Some(path) = &args.plan {
        let plan: SchemaPlan = read_document(path)?;
        info!(tables = plan.len(), "Using schema plan from {}", path.display());
        executor = executor.with_schema_plan(plan);
    } else if let Some(client) = ctx.llm_client().await? {
        info!(model = client.model_name(), "Schema plan will be proposed by the model");
        let architect = SchemaArchitect::new(client).with_config(&ctx.config.llm);
        executor = executor.with_proposer(Arc::new(architect));
    }

    let source = CsvRowSource::from_path(&args.file).with_delimiter(args.delimiter as u8);

    match executor.run(&source).await {
        Ok(report) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("serializing run report")?
                );
            } else {
                print!("{}", format_run_report(&report));
            }
            Ok(())
        }
        Err(e) => bail!("{}", e.user_message()),
    }
}

//! `dnorm report` and `dnorm suggest`

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args, ValueEnum};
use data_normalization_sdk::llm::{ReportAnalyst, Summarizer};
use data_normalization_sdk::report::{MergePrecedence, ReportOutcome, ReportService, SuggestError};
use data_normalization_sdk::{
    Aggregation, AggregationMethod, ChartKind, JoinSpec, ReportQueryEngine, ReportRequest,
};
use tracing::debug;

use super::{AppContext, read_document};
use crate::output::{format_outcome, format_suggestions};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PrecedenceArg {
    ChildWins,
    ParentWins,
}

impl From<PrecedenceArg> for MergePrecedence {
    fn from(arg: PrecedenceArg) -> Self {
        match arg {
            PrecedenceArg::ChildWins => MergePrecedence::ChildWins,
            PrecedenceArg::ParentWins => MergePrecedence::ParentWins,
        }
    }
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Report request file (JSON or YAML); replaces the query options below
    #[arg(long, value_name = "PATH", conflicts_with_all = ["tables", "join", "columns"])]
    pub request: Option<PathBuf>,

    /// Tables to read, comma separated
    #[arg(long, value_delimiter = ',', value_name = "TABLES")]
    pub tables: Vec<String>,

    /// Columns to keep from a table, as TABLE:COL1,COL2 (repeatable)
    #[arg(long = "columns", value_name = "TABLE:COLS", value_parser = parse_columns)]
    pub columns: Vec<(String, Vec<String>)>,

    /// Join as PARENT.KEY=CHILD.KEY
    #[arg(long, value_name = "PARENT.KEY=CHILD.KEY", value_parser = parse_join)]
    pub join: Option<JoinSpec>,

    /// Group-by column for an aggregation
    #[arg(long, value_name = "COLUMN", requires = "aggregate")]
    pub group_by: Option<String>,

    /// Column to aggregate
    #[arg(long, value_name = "COLUMN", requires = "group_by")]
    pub aggregate: Option<String>,

    /// Aggregation method (sum, count, avg)
    #[arg(long, default_value = "sum", value_parser = parse_method)]
    pub method: AggregationMethod,

    /// Name of the aggregated column
    #[arg(long, value_name = "NAME")]
    pub output_column: Option<String>,

    /// Chart kind (bar, line, pie, doughnut, scatter)
    #[arg(long, default_value = "bar")]
    pub chart: String,

    /// Report title
    #[arg(long, default_value = "")]
    pub title: String,

    /// Ask the configured model for a narrative summary
    #[arg(long)]
    pub summarize: bool,

    /// Which side wins when joined rows share a field name
    #[arg(long, value_enum)]
    pub precedence: Option<PrecedenceArg>,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SuggestArgs {
    /// Run the Nth suggestion (1-based) instead of listing them
    #[arg(long, value_name = "N")]
    pub run: Option<usize>,

    /// Summarize the executed suggestion
    #[arg(long, requires = "run")]
    pub summarize: bool,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_columns(value: &str) -> Result<(String, Vec<String>), String> {
    let (table, columns) = value
        .split_once(':')
        .ok_or_else(|| format!("expected TABLE:COLS, got '{value}'"))?;
    let columns: Vec<String> = columns
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    if table.trim().is_empty() || columns.is_empty() {
        return Err(format!("expected TABLE:COLS, got '{value}'"));
    }
    Ok((table.trim().to_string(), columns))
}

fn parse_join(value: &str) -> Result<JoinSpec, String> {
    let invalid = || format!("expected PARENT.KEY=CHILD.KEY, got '{value}'");
    let (parent, child) = value.split_once('=').ok_or_else(invalid)?;
    let (parent_table, parent_key) = parent.trim().split_once('.').ok_or_else(invalid)?;
    let (child_table, child_key) = child.trim().split_once('.').ok_or_else(invalid)?;
    if [parent_table, parent_key, child_table, child_key]
        .iter()
        .any(|part| part.is_empty())
    {
        return Err(invalid());
    }
    Ok(JoinSpec::new(parent_table, parent_key, child_table, child_key))
}

fn parse_method(value: &str) -> Result<AggregationMethod, String> {
    value.parse()
}

impl ReportArgs {
    fn to_request(&self) -> anyhow::Result<ReportRequest> {
        if let Some(path) = &self.request {
            return read_document(path);
        }
        if self.tables.is_empty() {
            bail!("--tables or --request is required");
        }

        let mut request = ReportRequest::new(self.tables.iter().cloned())
            .with_chart_kind(ChartKind::from(self.chart.clone()));
        if let Some(join) = &self.join {
            request = request.with_join(join.clone());
        }
        for (table, columns) in &self.columns {
            request = request.with_columns(table.clone(), columns.iter().cloned());
        }
        if let (Some(group_by), Some(column)) = (&self.group_by, &self.aggregate) {
            let output = self
                .output_column
                .clone()
                .unwrap_or_else(|| format!("{} of {column}", self.method));
            request =
                request.with_aggregation(Aggregation::new(group_by, column, self.method, output));
        }
        Ok(request)
    }
}

async fn build_service(
    ctx: &AppContext,
    precedence: Option<PrecedenceArg>,
    summarize: bool,
    analyst: bool,
) -> anyhow::Result<ReportService> {
    let mut report_config = ctx.config.report.clone();
    if let Some(precedence) = precedence {
        report_config = report_config.with_merge_precedence(precedence.into());
    }
    let mut service =
        ReportService::new(ctx.storage.clone(), ReportQueryEngine::new(report_config));

    if summarize || analyst {
        let Some(client) = ctx.llm_client().await? else {
            bail!("no language model is configured; set [llm.provider] in the config file");
        };
        if analyst {
            service = service
                .with_analyst(ReportAnalyst::new(client.clone()).with_config(&ctx.config.llm));
        }
        if summarize {
            service = service.with_summarizer(Summarizer::new(client).with_config(&ctx.config.llm));
        }
    }
    Ok(service)
}

fn print_outcome(outcome: &ReportOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(outcome).context("serializing report")?
        );
    } else {
        print!("{}", format_outcome(outcome));
    }
    Ok(())
}

pub async fn run_report(ctx: &AppContext, args: &ReportArgs) -> anyhow::Result<()> {
    let request = args.to_request()?;
    debug!(?request, "Report request");

    let service = build_service(ctx, args.precedence, args.summarize, false).await?;
    let outcome = service.run_request(&args.title, "", &request).await?;
    print_outcome(&outcome, args.json)
}

pub async fn run_suggest(ctx: &AppContext, args: &SuggestArgs) -> anyhow::Result<()> {
    let service = build_service(ctx, None, args.summarize, true).await?;
    let suggestions = service.suggest().await.map_err(|e| match e {
        SuggestError::Llm(llm) => anyhow::anyhow!(llm.user_message()),
        other => anyhow::anyhow!(other),
    })?;

    let Some(index) = args.run else {
        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&suggestions).context("serializing suggestions")?
            );
        } else {
            print!("{}", format_suggestions(&suggestions));
        }
        return Ok(());
    };

    let suggestion = index
        .checked_sub(1)
        .and_then(|i| suggestions.get(i))
        .with_context(|| format!("no suggestion #{index}; {} available", suggestions.len()))?;
    let outcome = service.run(suggestion).await?;
    print_outcome(&outcome, args.json)
}

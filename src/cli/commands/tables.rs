//! `dnorm tables`, `dnorm show` and `dnorm delete`

use anyhow::{Context, bail};
use clap::Args;
use data_normalization_sdk::source::infer_headers;

use super::AppContext;
use crate::output::format_table;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Table name
    pub table: String,

    /// Maximum rows to print
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Print rows as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Table name
    pub table: String,
}

pub async fn run_tables(ctx: &AppContext) -> anyhow::Result<()> {
    let tables = ctx.storage.list_tables().await?;
    if tables.is_empty() {
        println!("No tables stored.");
        return Ok(());
    }

    let plan = ctx.storage.load_schema_plan().await?.unwrap_or_default();
    for table in tables {
        let rows = ctx.storage.load_rows(&table).await?;
        match plan.get(&table) {
            Some(schema) if !schema.foreign_keys.is_empty() => {
                let parents = schema.parent_tables().join(", ");
                println!("{table} ({} rows, references {parents})", rows.len());
            }
            _ => println!("{table} ({} rows)", rows.len()),
        }
    }
    Ok(())
}

pub async fn run_show(ctx: &AppContext, args: &ShowArgs) -> anyhow::Result<()> {
    if !ctx.storage.table_exists(&args.table).await? {
        bail!("unknown table: {}", args.table);
    }
    let rows = ctx.storage.load_rows(&args.table).await?;
    let shown = &rows[..rows.len().min(args.limit)];

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(shown).context("serializing rows")?
        );
        return Ok(());
    }

    let plan = ctx.storage.load_schema_plan().await?.unwrap_or_default();
    let headers = match plan.get(&args.table) {
        Some(schema) => schema.columns.clone(),
        None => infer_headers(shown),
    };
    print!("{}", format_table(&headers, shown));
    if rows.len() > shown.len() {
        println!("… {} more row(s)", rows.len() - shown.len());
    }
    Ok(())
}

pub async fn run_delete(ctx: &AppContext, args: &DeleteArgs) -> anyhow::Result<()> {
    if !ctx.storage.table_exists(&args.table).await? {
        bail!("unknown table: {}", args.table);
    }
    ctx.storage.delete_table(&args.table).await?;
    println!("Deleted table {}", args.table);
    Ok(())
}

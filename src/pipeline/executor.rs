//! Pipeline executor for one ingest run

use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::config::{IngestMode, PipelineConfig};
use super::error::{PipelineError, PipelineResult};
use super::state::{PipelineState, RunReport};
use crate::llm::{FixedPlanProposer, SchemaProposer};
use crate::materialize::{LookupMap, LookupRegistry, MaterializeStats, TableMaterializer};
use crate::models::{Row, SchemaPlan, TableSchema};
use crate::ordering::resolve_order;
use crate::source::{ParseMode, RowSource, collect_rows, infer_headers};
use crate::storage::StorageBackend;
use crate::validation::{SchemaPlanError, validate_plan};

/// Config key the last run report is stored under
pub const LAST_RUN_CONFIG: &str = "last_run";

/// Everything one run owns
struct RunContext {
    report: RunReport,
    plan: Option<SchemaPlan>,
    registry: LookupRegistry,
    rows: Vec<Row>,
}

impl RunContext {
    fn new(report: RunReport) -> Self {
        Self {
            report,
            plan: None,
            registry: LookupRegistry::new(),
            rows: Vec::new(),
        }
    }

    fn enter(&mut self, state: PipelineState) {
        debug!(state = state.name(), "Entering state");
        self.report.enter(state);
    }
}

/// Runs sources through proposal, ordering, materialization and persistence
pub struct PipelineExecutor {
    config: PipelineConfig,
    storage: Arc<dyn StorageBackend>,
    proposer: Option<Arc<dyn SchemaProposer>>,
    materializer: TableMaterializer,
}

impl PipelineExecutor {
    /// Create a new pipeline executor
    pub fn new(config: PipelineConfig, storage: Arc<dyn StorageBackend>) -> PipelineResult<Self> {
        config.validate().map_err(PipelineError::config)?;
        let materializer = TableMaterializer::new(config.key_encoding);
        Ok(Self {
            config,
            storage,
            proposer: None,
            materializer,
        })
    }

    /// Ask `proposer` for a plan on every run
    pub fn with_proposer(mut self, proposer: Arc<dyn SchemaProposer>) -> Self {
        self.proposer = Some(proposer);
        self
    }

    /// Use a fixed plan and skip the proposal step
    pub fn with_schema_plan(self, plan: SchemaPlan) -> Self {
        self.with_proposer(Arc::new(FixedPlanProposer::new(plan)))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline over `source`
    ///
    /// On failure the error is returned; tables written before the failing
    /// table stay in storage, and the failed report is still recorded.
    pub async fn run(&self, source: &dyn RowSource) -> PipelineResult<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let mut ctx = RunContext::new(RunReport::new(
            &run_id,
            source.name(),
            self.hash_config(),
        ));

        let span = info_span!(
            "pipeline_run",
            run_id = %run_id,
            source = source.name(),
            mode = self.config.ingest_mode.name()
        );

        let start = Instant::now();
        let result = self.execute(source, &mut ctx).instrument(span).await;

        match &result {
            Ok(()) => {
                ctx.report.complete();
                info!(
                    run_id = %run_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    tables = ctx.report.tables.len(),
                    "Pipeline completed"
                );
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Pipeline failed");
                ctx.report.fail(e.to_string());
            }
        }

        self.record(&ctx.report).await;
        result.map(|()| ctx.report)
    }

    async fn execute(&self, source: &dyn RowSource, ctx: &mut RunContext) -> PipelineResult<()> {
        ctx.enter(PipelineState::ParsingPreview);
        let preview = collect_rows(source, ParseMode::Preview(self.config.preview_rows)).await?;
        let headers = infer_headers(&preview);
        if headers.is_empty() {
            return Err(PipelineError::NoRows(source.name().to_string()));
        }
        debug!(headers = ?headers, "Preview parsed");
        ctx.report.headers = headers.clone();

        ctx.enter(PipelineState::AwaitingSchemaPlan);
        let plan = match self.propose(&headers).await {
            Ok(plan) => plan,
            Err(SchemaPlanError::ProposalFailed(reason))
                if self.config.fallback_table.is_some() =>
            {
                warn!(reason = %reason, "No schema plan, storing rows as a single table");
                return self.ingest_single_table(source, ctx).await;
            }
            Err(e) => return Err(e.into()),
        };

        validate_plan(&plan)?;
        let order = resolve_order(&plan)?;
        if order.is_empty() {
            return Err(SchemaPlanError::Empty.into());
        }
        info!(order = ?order, "Table order resolved");
        ctx.report.table_order = order.clone();
        ctx.plan = Some(plan);

        ctx.enter(PipelineState::ParsingFull);
        ctx.rows = collect_rows(source, ParseMode::Full).await?;
        if ctx.rows.is_empty() {
            return Err(PipelineError::NoRows(source.name().to_string()));
        }
        ctx.report.rows_parsed = ctx.rows.len();

        for (index, name) in order.iter().enumerate() {
            ctx.enter(PipelineState::MaterializingTables {
                index,
                table: name.clone(),
            });
            let stats = self.materialize_table(name, ctx).await?;
            ctx.report.tables.push(stats);
        }

        ctx.enter(PipelineState::PersistingSchema);
        if let Some(plan) = ctx.plan.take() {
            let mut stored = self.storage.load_schema_plan().await?.unwrap_or_default();
            stored.merge(plan);
            self.storage.save_schema_plan(&stored).await?;
            debug!(tables = stored.len(), "Schema plan persisted");
        }

        ctx.enter(PipelineState::Done);
        Ok(())
    }

    async fn propose(&self, headers: &[String]) -> Result<SchemaPlan, SchemaPlanError> {
        match &self.proposer {
            Some(proposer) => proposer.propose(headers).await,
            None => Err(SchemaPlanError::ProposalFailed(
                "no schema proposer is configured".to_string(),
            )),
        }
    }

    async fn materialize_table(
        &self,
        name: &str,
        ctx: &mut RunContext,
    ) -> PipelineResult<MaterializeStats> {
        let plan = ctx
            .plan
            .as_ref()
            .ok_or_else(|| SchemaPlanError::Invalid("schema plan missing from run".to_string()))?;
        let schema = plan
            .get(name)
            .ok_or_else(|| SchemaPlanError::Invalid(format!("table '{name}' not in plan")))?;

        self.prepare_table(schema, &mut ctx.registry).await?;

        let output = self
            .materializer
            .materialize(schema, &ctx.rows, &mut ctx.registry, plan)
            .map_err(|source| PipelineError::TableMaterialization {
                table: name.to_string(),
                source,
            })?;

        if !output.table.is_empty() {
            self.storage.save_rows(name, &output.table.rows).await?;
        }

        let stats = output.stats;
        info!(
            table = name,
            unique_rows = stats.unique_rows,
            duplicates_dropped = stats.duplicates_dropped,
            already_stored = stats.already_stored,
            unresolved_foreign_keys = stats.unresolved_foreign_keys,
            "Table materialized"
        );
        Ok(stats)
    }

    /// Apply the ingest mode to a table about to be written
    async fn prepare_table(
        &self,
        schema: &TableSchema,
        registry: &mut LookupRegistry,
    ) -> PipelineResult<()> {
        match self.config.ingest_mode {
            IngestMode::Replace => {
                self.storage.delete_table(&schema.name).await?;
            }
            IngestMode::Append => {
                if self.storage.table_exists(&schema.name).await? {
                    let stored = self.storage.load_rows(&schema.name).await?;
                    let map =
                        LookupMap::rebuild_from_rows(schema, &stored, self.config.key_encoding);
                    debug!(
                        table = %schema.name,
                        stored_rows = stored.len(),
                        next_counter = map.next_counter(),
                        "Lookup map rebuilt from storage"
                    );
                    registry.insert(map);
                }
            }
        }
        Ok(())
    }

    async fn ingest_single_table(
        &self,
        source: &dyn RowSource,
        ctx: &mut RunContext,
    ) -> PipelineResult<()> {
        let table = self
            .config
            .fallback_table
            .clone()
            .ok_or_else(|| PipelineError::ConfigError("no fallback table configured".to_string()))?;

        ctx.enter(PipelineState::ManualSingleTable);
        let rows = collect_rows(source, ParseMode::Full).await?;
        if rows.is_empty() {
            return Err(PipelineError::NoRows(source.name().to_string()));
        }

        if self.config.ingest_mode == IngestMode::Replace {
            self.storage.delete_table(&table).await?;
        }
        self.storage.save_rows(&table, &rows).await?;
        info!(table = %table, rows = rows.len(), "Rows stored as a single table");

        ctx.report.rows_parsed = rows.len();
        ctx.report.tables.push(MaterializeStats {
            table: table.clone(),
            input_rows: rows.len(),
            unique_rows: rows.len(),
            ..MaterializeStats::default()
        });
        ctx.report.fallback_table = Some(table);

        ctx.enter(PipelineState::Done);
        Ok(())
    }

    async fn record(&self, report: &RunReport) {
        if !self.config.record_run_report {
            return;
        }
        let value = match serde_json::to_value(report) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to serialize run report");
                return;
            }
        };
        if let Err(e) = self.storage.save_config(LAST_RUN_CONFIG, &value).await {
            warn!(error = %e, "Failed to record run report");
        }
    }

    fn hash_config(&self) -> String {
        let bytes = serde_json::to_vec(&self.config).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }
}

//! Enrichment Engine: the orchestrator that turns a resolved
//! [`Strategy`] and a row stream into audit-log entries and projected
//! writes, one model pass at a time.

mod pipeline;
mod render;

use crate::config::{Config, EnrichmentConfig};
use crate::error::{EngineError, Error, Result};
use crate::provider::{GenerationParams, Provider, ProviderRegistry};
use crate::query::{self, PlanRequest, RowSelector};
use crate::schema::{Validator, WireSchema, compile};
use crate::storage::{SourceRow, Store};
use crate::strategy::{self, Strategy};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Provider calls in flight at once.
pub const DEFAULT_API_LIMIT: usize = 30;

/// DB writers in flight at once.
pub const DEFAULT_DB_LIMIT: usize = 2;

/// Rows processed between periodic WAL checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 1000;

/// How many rows may be in flight per available API permit, bounding the
/// JoinSet's queued-but-not-yet-running task count for very large row
/// streams.
const INFLIGHT_MULTIPLIER: usize = 4;

/// Why a row produced no provider call.
///
/// `FilteredByQuery` rows never reach the engine at all — the Query
/// Planner's `IS NULL` filter excludes them from the row stream before the
/// engine ever sees them — so the engine itself only ever returns
/// `AlreadyDone` or `Cancelled`; the variant is kept here because it is
/// part of the same conceptual skip taxonomy the audit log and `enrich
/// status` report against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// An audit-log row already exists for this `(sha1, name, model)`.
    AlreadyDone,
    /// Excluded from the row stream by the Query Planner's filter.
    FilteredByQuery,
    /// The run was cancelled before this row's call was made.
    Cancelled,
}

/// The result of running one row through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    /// A provider call was made and durably recorded.
    Processed,
    /// No call was made.
    Skipped(SkipReason),
    /// A call was made but failed non-recoverably; recorded as a failed
    /// audit row.
    Failed,
}

/// Aggregate counters for one model pass over one enrichment.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ModelPassSummary {
    /// Model this pass ran against.
    pub model: String,
    /// Rows that produced a successful provider call and durable write.
    pub processed: u64,
    /// Rows skipped because an audit row already existed.
    pub already_done: u64,
    /// Rows skipped due to cancellation.
    pub cancelled: u64,
    /// Rows that failed non-recoverably.
    pub failed: u64,
}

/// Aggregate result of running one enrichment, across all its model passes.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunSummary {
    /// Enrichment name this summary covers.
    pub enrichment_name: String,
    /// One entry per model pass, in declaration order.
    pub passes: Vec<ModelPassSummary>,
}

impl RunSummary {
    /// Total rows processed across every model pass.
    #[must_use]
    pub fn total_processed(&self) -> u64 {
        self.passes.iter().map(|p| p.processed).sum()
    }
}

/// Per-run flags controlling the engine's behavior.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Reprocess rows that already carry an audit-log entry.
    pub overwrite: bool,
    /// Truncate prompts that exceed the model's context window rather than
    /// failing the row.
    pub truncate: bool,
    /// Maximum concurrent provider calls.
    pub api_limit: usize,
    /// Maximum concurrent DB writers.
    pub db_limit: usize,
    /// Rows between periodic WAL checkpoints.
    pub checkpoint_interval: u64,
    /// `--limit` override.
    pub limit: Option<u64>,
    /// `--rowid`/`--sha1` bypass.
    pub row_selector: Option<RowSelector>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            truncate: false,
            api_limit: DEFAULT_API_LIMIT,
            db_limit: DEFAULT_DB_LIMIT,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            limit: None,
            row_selector: None,
        }
    }
}

/// Everything one row's pipeline invocation needs, grouped so a single
/// `Arc` can be shared across every concurrently-running row task for one
/// model pass.
struct RowContext {
    store: Arc<dyn Store>,
    provider: Arc<dyn Provider>,
    strategy: Arc<Strategy>,
    validator: Arc<Validator>,
    wire_schema: Arc<WireSchema>,
    enrichment_name: String,
    model: String,
    prompt_id: String,
    prompt_template: String,
    system_prompt: Option<String>,
    append: Option<String>,
    overwrite: bool,
    truncate: bool,
    generation_params: GenerationParams,
    api_semaphore: Arc<Semaphore>,
    db_semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

/// Runs one enrichment task to completion: resolves its strategy, plans and
/// fetches its row stream once, then runs one pipeline pass per declared
/// model.
///
/// # Errors
///
/// Returns an [`Error`] for configuration, strategy, query-planning, or
/// Store-initialization failures — all fatal at task start. Per-row failures never surface here; they are reflected in the
/// returned [`RunSummary`] and in the audit log.
pub async fn run_enrichment(
    config: &Config,
    enrichment: &EnrichmentConfig,
    store: Arc<dyn Store>,
    providers: &ProviderRegistry,
    options: &EngineOptions,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let (validator, wire_schema) = compile(&enrichment.schema).map_err(Error::Schema)?;
    let compiled_schema = validator.schema().clone();
    let strategy = Arc::new(strategy::resolve(enrichment, &config.default_table, compiled_schema).map_err(Error::Strategy)?);
    let validator = Arc::new(validator);
    let wire_schema = Arc::new(wire_schema);

    if strategy.storage_mode == crate::strategy::StorageMode::SeparateTable {
        store.ensure_output_table(&strategy).await?;
    }

    let prompt_id = store.register_prompt(&enrichment.name, &enrichment.prompt, enrichment.system_prompt.as_deref()).await?;

    let base_sql = config.resolve_query_text(&enrichment.input.query);
    let output_column = match strategy.storage_mode {
        crate::strategy::StorageMode::DirectColumn => strategy.output_columns.first().map(String::as_str),
        crate::strategy::StorageMode::SeparateTable => None,
    };
    let plan = query::plan(&PlanRequest {
        base_sql,
        table: &strategy.input_table,
        output_column,
        overwrite: options.overwrite,
        limit: options.limit,
        row_selector: options.row_selector.clone(),
    })
    .map_err(Error::Query)?;

    let rows = store.fetch_rows(&plan.sql, &[]).await?;
    let qualified = fetch_qualified_columns(store.as_ref(), &strategy, &rows).await?;

    let truncate = enrichment.truncate.unwrap_or(options.truncate);

    let api_semaphore = Arc::new(Semaphore::new(options.api_limit.max(1)));
    let db_semaphore = Arc::new(Semaphore::new(options.db_limit.max(1)));

    let mut summary = RunSummary {
        enrichment_name: enrichment.name.clone(),
        passes: Vec::with_capacity(strategy.models.len()),
    };

    for model in &strategy.models {
        let provider = providers.resolve(model).map_err(Error::Provider)?;
        let generation_params = model_generation_params(config, model);
        let ctx = Arc::new(RowContext {
            store: store.clone(),
            provider,
            strategy: strategy.clone(),
            validator: validator.clone(),
            wire_schema: wire_schema.clone(),
            enrichment_name: enrichment.name.clone(),
            model: model.clone(),
            prompt_id: prompt_id.clone(),
            prompt_template: enrichment.prompt.clone(),
            system_prompt: enrichment.system_prompt.clone(),
            append: enrichment.append_file.clone(),
            overwrite: options.overwrite,
            truncate,
            generation_params,
            api_semaphore: api_semaphore.clone(),
            db_semaphore: db_semaphore.clone(),
            cancel: cancel.clone(),
        });

        let pass = run_model_pass(ctx, &rows, &qualified, store.as_ref(), options.checkpoint_interval).await?;
        summary.passes.push(pass);
    }

    Ok(summary)
}

async fn run_model_pass(
    ctx: Arc<RowContext>,
    rows: &[SourceRow],
    qualified: &Arc<BTreeMap<(String, String), BTreeMap<String, String>>>,
    store: &dyn Store,
    checkpoint_interval: u64,
) -> Result<ModelPassSummary> {
    let mut summary = ModelPassSummary {
        model: ctx.model.clone(),
        ..Default::default()
    };

    let mut tasks = JoinSet::new();
    let max_inflight = ctx.api_semaphore.available_permits().max(1) * INFLIGHT_MULTIPLIER;
    let mut since_checkpoint: u64 = 0;

    for row in rows {
        if tasks.len() >= max_inflight {
            if let Some(joined) = tasks.join_next().await {
                account(&mut summary, joined);
                since_checkpoint += 1;
                if since_checkpoint >= checkpoint_interval {
                    store.checkpoint().await?;
                    since_checkpoint = 0;
                }
            }
        }
        let ctx = ctx.clone();
        let qualified = qualified.clone();
        let row = row.clone();
        tasks.spawn(async move { pipeline::process_row(&ctx, &row, &qualified).await });
    }

    while let Some(joined) = tasks.join_next().await {
        account(&mut summary, joined);
        since_checkpoint += 1;
        if since_checkpoint >= checkpoint_interval {
            store.checkpoint().await?;
            since_checkpoint = 0;
        }
    }

    if since_checkpoint > 0 {
        store.checkpoint().await?;
    }

    Ok(summary)
}

fn account(summary: &mut ModelPassSummary, joined: std::result::Result<RowOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(RowOutcome::Processed) => summary.processed += 1,
        Ok(RowOutcome::Skipped(SkipReason::AlreadyDone)) => summary.already_done += 1,
        Ok(RowOutcome::Skipped(SkipReason::Cancelled)) => summary.cancelled += 1,
        Ok(RowOutcome::Skipped(SkipReason::FilteredByQuery)) => {}
        Ok(RowOutcome::Failed) => summary.failed += 1,
        Err(join_err) => {
            tracing::warn!(error = %join_err, "row task panicked");
            summary.failed += 1;
        }
    }
}

/// Runs the two-phase fetch for `table.col` input references: one
/// extra query per distinct qualified table, keyed by the strategy's join
/// key.
async fn fetch_qualified_columns(
    store: &dyn Store,
    strategy: &Strategy,
    rows: &[SourceRow],
) -> Result<Arc<BTreeMap<(String, String), BTreeMap<String, String>>>> {
    let mut result = BTreeMap::new();
    let grouped = query::qualified_columns_by_table(&strategy.input_columns);
    if grouped.is_empty() {
        return Ok(Arc::new(result));
    }

    let keys: Vec<String> = rows.iter().map(|r| r.sha1.clone()).collect();
    for (table, columns) in grouped {
        for column in columns {
            let values = store.fetch_qualified_columns(table, &strategy.key_column, &column.column, &keys).await?;
            result.insert((table.to_string(), column.column.clone()), values);
        }
    }
    Ok(Arc::new(result))
}

fn model_generation_params(config: &Config, model: &str) -> GenerationParams {
    let mut params = GenerationParams::default();
    if let Some(settings) = config.models.get(model) {
        if let Some(max_tokens) = settings.max_tokens {
            params.max_tokens = max_tokens;
        }
        if let Some(temperature) = settings.temperature {
            params.temperature = temperature;
        }
    }
    params
}

/// Raised by the CLI before a run starts when the Cost Estimator's
/// projection exceeds the confirmation threshold and the operator declines.
#[must_use]
pub fn cost_confirmation_declined(estimated: f64, threshold: f64) -> Error {
    Error::Engine(EngineError::CostConfirmationDeclined { estimated, threshold })
}

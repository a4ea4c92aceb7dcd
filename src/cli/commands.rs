//! CLI command implementations.
//!
//! Wires `Config`/`Store`/`Strategy`/`query::plan`/`cost::estimate`/
//! `engine::run_enrichment` together behind each subcommand.

use crate::cli::output::{
    OutputFormat, format_cost_estimate, format_enrichment_list, format_history, format_prompt, format_run_summary, format_status,
};
use crate::cli::parser::{Cli, Commands};
use crate::config::Config;
use crate::cost::{self, DEFAULT_COST_THRESHOLD};
use crate::engine::{self, EngineOptions};
use crate::error::{CommandError, EngineError, Error, Result};
use crate::provider::ProviderRegistry;
use crate::query::RowSelector;
use crate::schema::compile;
use crate::storage::{SqliteStore, Store};
use crate::strategy;
use std::io::{self, Write as IoWrite};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub async fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let db_path = cli.get_db_path();

    match &cli.command {
        Commands::Init { force } => cmd_init(&db_path, *force, format).await,
        Commands::Status => cmd_status(&db_path, format).await,
        Commands::ListEnrichments => cmd_list_enrichments(&db_path, format).await,
        Commands::ShowPrompt { prompt_id } => cmd_show_prompt(&db_path, prompt_id, format).await,
        Commands::History { sha1, enrichment, limit } => cmd_history(&db_path, sha1.as_deref(), enrichment.as_deref(), *limit, format).await,
        Commands::Enrich { .. } => cmd_enrich(cli, format).await,
    }
}

async fn open_store(db_path: &std::path::Path) -> Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(db_path, crate::storage::DEFAULT_POOL_SIZE)?);
    store.init().await?;
    Ok(store)
}

/// Resolves `--config`, falling back to `~/.config/enrich/config.yaml` the
/// way the agent's Prompt Registry falls back to a home-directory default
/// when no explicit path is given.
///
/// # Errors
///
/// Returns [`CommandError::MissingArgument`] if no path was given and the
/// platform has no resolvable config directory.
fn resolve_config_path(explicit: Option<&std::path::Path>) -> Result<std::path::PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    dirs::config_dir()
        .map(|dir| dir.join("enrich").join("config.yaml"))
        .ok_or_else(|| Error::Command(CommandError::MissingArgument("--config".to_string())))
}

async fn cmd_init(db_path: &std::path::Path, _force: bool, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path).await?;
    let stats = store.stats().await?;
    Ok(format_status(&stats, format))
}

async fn cmd_status(db_path: &std::path::Path, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path).await?;
    let stats = store.stats().await?;
    Ok(format_status(&stats, format))
}

async fn cmd_list_enrichments(db_path: &std::path::Path, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path).await?;
    let names = store.known_enrichments().await?;
    Ok(format_enrichment_list(&names, format))
}

async fn cmd_show_prompt(db_path: &std::path::Path, prompt_id: &str, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path).await?;
    let (prompt, system_prompt) = store
        .prompt_text(prompt_id)
        .await?
        .ok_or_else(|| Error::Command(CommandError::InvalidArgument(format!("no such prompt: {prompt_id}"))))?;
    Ok(format_prompt(prompt_id, &prompt, system_prompt.as_deref(), format))
}

async fn cmd_history(db_path: &std::path::Path, sha1: Option<&str>, enrichment: Option<&str>, limit: usize, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path).await?;
    let mut entries = store.history(enrichment, limit).await?;
    if let Some(sha1) = sha1 {
        entries.retain(|e| e.sha1 == sha1);
    }
    Ok(format_history(&entries, format))
}

#[allow(clippy::too_many_lines)]
async fn cmd_enrich(cli: &Cli, format: OutputFormat) -> Result<String> {
    let Commands::Enrich {
        config: config_path,
        enrichments,
        model,
        limit,
        rowid,
        sha1,
        overwrite,
        truncate,
        skip_cost_check,
        cost_threshold,
        api_limit,
        db_limit,
    } = &cli.command
    else {
        unreachable!("cmd_enrich only called for Commands::Enrich")
    };

    let config_path = resolve_config_path(config_path.as_deref())?;
    let config = Config::load(&config_path)?;
    config.validate()?;

    let db_path = cli.db_path.clone().unwrap_or_else(|| std::path::PathBuf::from(&config.database));
    let store = open_store(&db_path).await?;
    let providers = ProviderRegistry::new();

    let row_selector = match (rowid, sha1) {
        (Some(id), None) => Some(RowSelector::Rowid(*id)),
        (None, Some(key)) => Some(RowSelector::Sha1(key.clone())),
        (None, None) => None,
        (Some(_), Some(_)) => return Err(Error::Query(crate::error::QueryError::ConflictingRowSelector)),
    };

    let options = EngineOptions {
        overwrite: *overwrite,
        truncate: *truncate,
        api_limit: api_limit.unwrap_or(engine::DEFAULT_API_LIMIT),
        db_limit: db_limit.unwrap_or(engine::DEFAULT_DB_LIMIT),
        checkpoint_interval: engine::DEFAULT_CHECKPOINT_INTERVAL,
        limit: *limit,
        row_selector,
    };

    let threshold = cost_threshold.unwrap_or(DEFAULT_COST_THRESHOLD);

    let names: Vec<&str> = if enrichments.is_empty() {
        config.enrichments.iter().map(|e| e.name.as_str()).collect()
    } else {
        enrichments.iter().map(String::as_str).collect()
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let mut output = String::new();
    for name in names {
        let mut enrichment = config
            .enrichment(name)
            .cloned()
            .ok_or_else(|| Error::Command(CommandError::InvalidArgument(format!("unknown enrichment: {name}"))))?;

        if let Some(model_override) = model {
            enrichment.model = crate::config::ModelSelector::One(model_override.clone());
        }

        if !skip_cost_check {
            if let Some(estimate) = estimate_enrichment_cost(&config, &enrichment)? {
                output.push_str(&format_cost_estimate(&estimate, threshold, format));
                if estimate.exceeds(threshold) && !confirm_run(&estimate, threshold)? {
                    return Err(engine::cost_confirmation_declined(estimate.total_cost, threshold));
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Engine(EngineError::Cancelled));
        }

        let summary = engine::run_enrichment(&config, &enrichment, store.clone(), &providers, &options, cancel.clone()).await?;
        output.push_str(&format_run_summary(&summary, format));
    }

    Ok(output)
}

/// Estimates the cost of one enrichment's first model, using its prompt
/// template as a stand-in rendered prompt.
fn estimate_enrichment_cost(config: &Config, enrichment: &crate::config::EnrichmentConfig) -> Result<Option<cost::CostEstimate>> {
    let (validator, _wire) = compile(&enrichment.schema).map_err(Error::Schema)?;
    let compiled_schema = validator.schema().clone();
    let strategy = strategy::resolve(enrichment, &config.default_table, compiled_schema).map_err(Error::Strategy)?;
    let Some(model) = strategy.models.first() else {
        return Ok(None);
    };
    match cost::estimate(model, &enrichment.prompt, validator.schema(), 1) {
        Ok(estimate) => Ok(Some(estimate)),
        Err(crate::error::ProviderError::UnknownModel(_)) => Ok(None),
        Err(err) => Err(Error::Provider(err)),
    }
}

/// Prompts the operator to confirm a run whose estimated cost exceeds the
/// threshold. Declines by default on non-interactive input (EOF).
fn confirm_run(estimate: &cost::CostEstimate, threshold: f64) -> Result<bool> {
    print!("Estimated cost ${:.2} exceeds threshold ${threshold:.2}. Continue? [y/N] ", estimate.total_cost);
    io::stdout().flush().ok();
    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return Ok(false);
    }
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelSelector;

    fn sample_config() -> Config {
        serde_yaml::from_str(
            r"
database: :memory:
default_table: documents
models:
  gpt-4o-mini:
    max_tokens: 500
enrichments:
  - name: sentiment
    prompt: 'Classify: {raw_content}'
    input:
      query: SELECT * FROM documents
      input_columns: [raw_content]
    schema:
      sentiment:
        enum: [positive, negative, neutral]
    output_column: sentiment
    model: gpt-4o-mini
",
        )
        .unwrap()
    }

    #[test]
    fn estimate_enrichment_cost_uses_first_model() {
        let config = sample_config();
        let enrichment = config.enrichment("sentiment").unwrap();
        let estimate = estimate_enrichment_cost(&config, enrichment).unwrap().unwrap();
        assert_eq!(estimate.model, "gpt-4o-mini");
    }

    #[test]
    fn resolve_config_path_prefers_explicit_path() {
        let explicit = std::path::Path::new("pipeline.yaml");
        assert_eq!(resolve_config_path(Some(explicit)).unwrap(), explicit);
    }

    #[test]
    fn resolve_config_path_falls_back_to_config_dir() {
        let resolved = resolve_config_path(None).unwrap();
        assert!(resolved.ends_with("enrich/config.yaml"));
    }

    #[test]
    fn estimate_returns_none_for_unknown_model() {
        let mut config = sample_config();
        config.enrichments[0].model = ModelSelector::One("local/custom".to_string());
        let enrichment = config.enrichment("sentiment").unwrap();
        assert!(estimate_enrichment_cost(&config, enrichment).unwrap().is_none());
    }
}

//! CLI argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Document-enrichment pipeline: ingest into a content-addressed store,
/// then repeatedly enrich rows by calling LLM providers under a declared
/// YAML configuration.
#[derive(Parser, Debug)]
#[command(name = "enrich", version, about, long_about = None, propagate_version = true)]
pub struct Cli {
    /// Output format: text, json, or ndjson.
    #[arg(long, global = true, default_value = "text")]
    pub format: String,

    /// Raise the console log level from WARN to DEBUG.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Database path override, for commands that do not take a `--config`.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Resolves the effective database path: `--db-path` if given, else
    /// the default database file name in the current directory.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::storage::DEFAULT_DB_NAME))
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Creates the store's tables, idempotently.
    Init {
        /// Re-run migrations even if the store already reports initialized.
        #[arg(long)]
        force: bool,
    },

    /// Reports aggregate counters: audit rows, enrichments, prompts, db size.
    Status,

    /// Lists distinct enrichment names with at least one audit-log row.
    #[command(name = "list-enrichments")]
    ListEnrichments,

    /// Prints a registered prompt's text by id.
    #[command(name = "show-prompt")]
    ShowPrompt {
        /// Prompt Registry id.
        prompt_id: String,
    },

    /// Prints recent audit-log rows, most recent first.
    History {
        /// Restrict to rows for this content-address key.
        #[arg(long)]
        sha1: Option<String>,
        /// Restrict to rows for this enrichment name.
        #[arg(long)]
        enrichment: Option<String>,
        /// Maximum rows to return.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Runs one or more configured enrichments to completion.
    Enrich {
        /// Path to the YAML config file. Defaults to `~/.config/enrich/config.yaml`
        /// when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Enrichment names to run, comma-separated.
        #[arg(long, value_delimiter = ',')]
        enrichments: Vec<String>,

        /// Restrict to this model, overriding the enrichment's `model:` list.
        #[arg(long)]
        model: Option<String>,

        /// Maximum rows to process. Mutually exclusive with `--rowid`/`--sha1`.
        #[arg(long, conflicts_with_all = ["rowid", "sha1"])]
        limit: Option<u64>,

        /// Process only this `rowid`. Mutually exclusive with `--limit`/`--sha1`.
        #[arg(long, conflicts_with_all = ["limit", "sha1"])]
        rowid: Option<i64>,

        /// Process only this content-address key. Mutually exclusive with
        /// `--limit`/`--rowid`.
        #[arg(long, conflicts_with_all = ["limit", "rowid"])]
        sha1: Option<String>,

        /// Reprocess rows that already carry an audit-log entry.
        #[arg(long)]
        overwrite: bool,

        /// Truncate prompts exceeding the model's context window rather than
        /// failing the row.
        #[arg(long)]
        truncate: bool,

        /// Skip the interactive cost-confirmation prompt.
        #[arg(long)]
        skip_cost_check: bool,

        /// Cost confirmation threshold in USD.
        #[arg(long)]
        cost_threshold: Option<f64>,

        /// Maximum concurrent provider calls.
        #[arg(long)]
        api_limit: Option<usize>,

        /// Maximum concurrent DB writers.
        #[arg(long)]
        db_limit: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_enrich_invocation() {
        let cli = Cli::parse_from(["enrich", "enrich", "--config", "pipeline.yaml", "--enrichments", "sentiment"]);
        match cli.command {
            Commands::Enrich { config, enrichments, .. } => {
                assert_eq!(config, Some(PathBuf::from("pipeline.yaml")));
                assert_eq!(enrichments, vec!["sentiment"]);
            }
            other => panic!("expected Enrich, got {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_row_selectors() {
        let result = Cli::try_parse_from([
            "enrich", "enrich", "--config", "pipeline.yaml", "--enrichments", "sentiment", "--limit", "5", "--rowid", "3",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn splits_comma_separated_enrichments() {
        let cli = Cli::parse_from([
            "enrich", "enrich", "--config", "pipeline.yaml", "--enrichments", "sentiment,summary",
        ]);
        match cli.command {
            Commands::Enrich { enrichments, .. } => assert_eq!(enrichments, vec!["sentiment", "summary"]),
            other => panic!("expected Enrich, got {other:?}"),
        }
    }

    #[test]
    fn default_db_path_falls_back_to_constant() {
        let cli = Cli::parse_from(["enrich", "status"]);
        assert_eq!(cli.get_db_path(), PathBuf::from(crate::storage::DEFAULT_DB_NAME));
    }

    #[test]
    fn config_is_optional_and_defaults_to_none() {
        let cli = Cli::parse_from(["enrich", "enrich", "--enrichments", "sentiment"]);
        match cli.command {
            Commands::Enrich { config, .. } => assert_eq!(config, None),
            other => panic!("expected Enrich, got {other:?}"),
        }
    }
}

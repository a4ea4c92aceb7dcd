//! Output formatting for CLI commands.
//!
//! Supports text, JSON, and NDJSON output.

use crate::cost::CostEstimate;
use crate::engine::RunSummary;
use crate::storage::{HistoryEntry, StoreStats};
use serde::Serialize;
use std::fmt::Write;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Pretty-printed JSON output.
    Json,
    /// Newline-delimited JSON for streaming.
    Ndjson,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "ndjson" | "jsonl" | "stream" => Self::Ndjson,
            _ => Self::Text,
        }
    }

    /// Returns true if this format is a streaming format.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::Ndjson)
    }
}

/// Formats `enrich status`.
#[must_use]
pub fn format_status(stats: &StoreStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_status_text(stats),
        OutputFormat::Json | OutputFormat::Ndjson => format_json(stats),
    }
}

fn format_status_text(stats: &StoreStats) -> String {
    let mut output = String::new();
    output.push_str("Enrichment Store Status\n");
    output.push_str("========================\n\n");
    let _ = writeln!(output, "  Audit rows:    {}", stats.response_count);
    let _ = writeln!(output, "  Enrichments:   {}", stats.enrichment_count);
    let _ = writeln!(output, "  Prompts:       {}", stats.prompt_count);
    let _ = writeln!(output, "  Schema:        v{}", stats.schema_version);
    if let Some(size) = stats.db_size {
        let _ = writeln!(output, "  DB size:       {size} bytes");
    }
    output
}

/// Formats `enrich list-enrichments`.
#[must_use]
pub fn format_enrichment_list(names: &[String], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if names.is_empty() {
                return "No enrichments have run yet.\n".to_string();
            }
            let mut output = String::new();
            for name in names {
                let _ = writeln!(output, "{name}");
            }
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => format_json(&names),
    }
}

/// Formats `enrich show-prompt`.
#[must_use]
pub fn format_prompt(prompt_id: &str, prompt: &str, system_prompt: Option<&str>, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Prompt {prompt_id}");
            if let Some(system) = system_prompt {
                output.push_str("--- system ---\n");
                output.push_str(system);
                output.push('\n');
            }
            output.push_str("--- prompt ---\n");
            output.push_str(prompt);
            if !prompt.ends_with('\n') {
                output.push('\n');
            }
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => {
            #[derive(Serialize)]
            struct PromptOutput<'a> {
                prompt_id: &'a str,
                prompt: &'a str,
                system_prompt: Option<&'a str>,
            }
            format_json(&PromptOutput {
                prompt_id,
                prompt,
                system_prompt,
            })
        }
    }
}

/// Formats `enrich history`.
#[must_use]
pub fn format_history(entries: &[HistoryEntry], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if entries.is_empty() {
                return "No history rows found.\n".to_string();
            }
            let mut output = String::new();
            let _ = writeln!(output, "{:<42} {:<20} {:<18} {:<8} Created", "sha1", "enrichment", "model", "ok");
            output.push_str(&"-".repeat(100));
            output.push('\n');
            for entry in entries {
                let _ = writeln!(
                    output,
                    "{:<42} {:<20} {:<18} {:<8} {}",
                    entry.sha1,
                    entry.enrichment_name,
                    entry.model_used,
                    if entry.success { "yes" } else { "no" },
                    entry.created_at
                );
            }
            output
        }
        OutputFormat::Json => format_json(&entries),
        OutputFormat::Ndjson => entries.iter().map(format_json).collect::<Vec<_>>().join("\n"),
    }
}

/// Formats a pre-flight cost estimate, for the interactive confirmation gate.
#[must_use]
pub fn format_cost_estimate(estimate: &CostEstimate, threshold: f64, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Model:       {}", estimate.model);
            let _ = writeln!(output, "Rows:        {}", estimate.row_count);
            let _ = writeln!(
                output,
                "Tokens/row:  {} in, {} out",
                estimate.input_tokens_per_row, estimate.output_tokens_per_row
            );
            let _ = writeln!(output, "Est. cost:   ${:.2}", estimate.total_cost);
            if estimate.exceeds(threshold) {
                let _ = writeln!(output, "Exceeds confirmation threshold (${threshold:.2}).");
            }
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => {
            #[derive(Serialize)]
            struct EstimateOutput<'a> {
                model: &'a str,
                row_count: u64,
                input_tokens_per_row: u32,
                output_tokens_per_row: u32,
                total_cost: f64,
                threshold: f64,
                exceeds_threshold: bool,
            }
            format_json(&EstimateOutput {
                model: &estimate.model,
                row_count: estimate.row_count,
                input_tokens_per_row: estimate.input_tokens_per_row,
                output_tokens_per_row: estimate.output_tokens_per_row,
                total_cost: estimate.total_cost,
                threshold,
                exceeds_threshold: estimate.exceeds(threshold),
            })
        }
    }
}

/// Formats one enrichment run's summary, across every model pass.
#[must_use]
pub fn format_run_summary(summary: &RunSummary, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Enrichment: {}", summary.enrichment_name);
            for pass in &summary.passes {
                let _ = writeln!(
                    output,
                    "  [{}] processed={} already_done={} failed={} cancelled={}",
                    pass.model, pass.processed, pass.already_done, pass.failed, pass.cancelled
                );
            }
            let _ = writeln!(output, "  total processed: {}", summary.total_processed());
            output
        }
        OutputFormat::Json | OutputFormat::Ndjson => format_json(summary),
    }
}

/// Formats a value as JSON.
fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Formats an error for output.
///
/// When format is JSON, returns a structured error object.
/// When format is Text, returns the error message string.
#[must_use]
pub fn format_error(error: &crate::Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json | OutputFormat::Ndjson => {
            let (error_type, suggestion) = get_error_details(error);
            let json = serde_json::json!({
                "success": false,
                "error": {
                    "type": error_type,
                    "message": error.to_string(),
                    "suggestion": suggestion
                }
            });
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

/// Extracts error type and recovery suggestion from an error.
fn get_error_details(error: &crate::Error) -> (&'static str, Option<&'static str>) {
    use crate::error::{CommandError, EngineError, ProviderError, QueryError, SchemaError, StorageError, StrategyError};

    match error {
        crate::Error::Storage(e) => match e {
            StorageError::NotInitialized => ("NotInitialized", Some("Run 'enrich init' to initialize the database")),
            StorageError::Database(_) => ("DatabaseError", None),
            StorageError::Migration(_) => ("MigrationError", None),
            StorageError::Transaction(_) => ("TransactionError", None),
            StorageError::Serialization(_) => ("SerializationError", None),
            StorageError::MissingRelation(_) => ("MissingRelation", Some("Check table/column names, or run ingest first")),
            StorageError::RetriesExhausted { .. } => ("DatabaseBusy", Some("Lower --db-limit or retry later")),
        },
        crate::Error::Schema(e) => match e {
            SchemaError::UnknownType(_) => ("UnknownFieldType", None),
            SchemaError::EmptyEnum { .. } => ("EmptyEnum", None),
            SchemaError::TypeMismatch { .. } => ("TypeMismatch", None),
            SchemaError::NotInEnum { .. } => ("NotInEnum", None),
            SchemaError::ItemCountOutOfBounds { .. } => ("ItemCountOutOfBounds", None),
            SchemaError::TooLong { .. } => ("TooLong", None),
            SchemaError::NumberOutOfBounds { .. } => ("NumberOutOfBounds", None),
            SchemaError::UnknownConvert(_) => ("UnknownConvert", None),
            SchemaError::ConvertFailed { .. } => ("ConvertFailed", None),
            SchemaError::LanguageValidation { .. } => ("LanguageValidation", Some("Retried automatically up to 3 attempts")),
            SchemaError::InvalidJson(_) => ("InvalidJson", None),
        },
        crate::Error::Strategy(e) => match e {
            StrategyError::MissingSchema { .. } => ("MissingSchema", None),
            StrategyError::ComplexSchemaNeedsTable { .. } => ("ComplexSchemaNeedsTable", Some("Add an output_table to this enrichment")),
            StrategyError::MultiModelNeedsTable { .. } => ("MultiModelNeedsTable", Some("Add an output_table to this enrichment")),
            StrategyError::WrongColumnCount { .. } => ("WrongColumnCount", None),
            StrategyError::MalformedInputColumn(_) => ("MalformedInputColumn", None),
        },
        crate::Error::Query(e) => match e {
            QueryError::MissingRelation { .. } => ("MissingRelation", Some("Check table/column names, or run ingest first")),
            QueryError::UnknownStoredQuery(_) => ("UnknownStoredQuery", None),
            QueryError::ConflictingRowSelector => ("ConflictingRowSelector", Some("--limit, --rowid, and --sha1 are mutually exclusive")),
        },
        crate::Error::Provider(e) => match e {
            ProviderError::MissingCredentials(_) => ("MissingCredentials", Some("Set OPENAI_API_KEY or GEMINI_API_KEY")),
            ProviderError::Transport(_) => ("TransportError", None),
            ProviderError::Api { .. } => ("ApiError", None),
            ProviderError::UnknownModel(_) => ("UnknownModel", None),
            ProviderError::ContextExceeded { .. } => ("ContextExceeded", Some("Pass --truncate or shorten the input columns")),
        },
        crate::Error::Engine(e) => match e {
            EngineError::Cancelled => ("Cancelled", None),
            EngineError::CostConfirmationDeclined { .. } => ("CostConfirmationDeclined", Some("Raise --cost-threshold or pass --skip-cost-check")),
        },
        crate::Error::Command(e) => match e {
            CommandError::UnknownCommand(_) => ("UnknownCommand", None),
            CommandError::InvalidArgument(_) => ("InvalidArgument", None),
            CommandError::MissingArgument(_) => ("MissingArgument", None),
            CommandError::ExecutionFailed(_) => ("ExecutionFailed", None),
            CommandError::Cancelled => ("Cancelled", None),
            CommandError::OutputFormat(_) => ("OutputFormatError", None),
        },
        crate::Error::InvalidState { .. } => ("InvalidState", None),
        crate::Error::Config { .. } => ("ConfigError", Some("Check the YAML config file's syntax and required fields")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_format_aliases() {
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("jsonl"), OutputFormat::Ndjson);
        assert_eq!(OutputFormat::parse("anything-else"), OutputFormat::Text);
    }

    #[test]
    fn ndjson_is_streaming() {
        assert!(OutputFormat::Ndjson.is_streaming());
        assert!(!OutputFormat::Json.is_streaming());
    }

    #[test]
    fn empty_enrichment_list_reports_none_in_text() {
        let output = format_enrichment_list(&[], OutputFormat::Text);
        assert!(output.contains("No enrichments"));
    }

    #[test]
    fn error_text_format_is_display_string() {
        let err = crate::Error::InvalidState { message: "boom".to_string() };
        assert_eq!(format_error(&err, OutputFormat::Text), err.to_string());
    }

    #[test]
    fn error_json_format_includes_suggestion() {
        let err = crate::Error::Storage(crate::error::StorageError::NotInitialized);
        let json = format_error(&err, OutputFormat::Json);
        assert!(json.contains("NotInitialized"));
        assert!(json.contains("enrich init"));
    }
}

//! The `Store` trait and the audit-log / prompt-registry record types it
//! moves.

use crate::error::Result;
use crate::schema::DynValue;
use crate::strategy::Strategy;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

/// One row read off the result of a query-planner `SELECT`.
#[derive(Debug, Clone)]
pub struct SourceRow {
    /// The row's `rowid` in its source table.
    pub rowid: i64,
    /// Content-address key (`sha1` column value).
    pub sha1: String,
    /// Column name to raw text value, as selected.
    pub columns: BTreeMap<String, String>,
}

/// One audit-log entry to append before (and regardless of) a conditional
/// write.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    /// Fresh per-call id minted by the engine, linking this audit row to
    /// whatever projected write it produced.
    pub enrichment_id: String,
    /// Content-address key.
    pub sha1: String,
    /// Enrichment name.
    pub enrichment_name: String,
    /// Model that produced (or failed to produce) this response.
    pub model_used: String,
    /// Prompt Registry id this response was generated against.
    pub prompt_id: String,
    /// The fully rendered prompt sent to the provider, including any
    /// truncation marker.
    pub full_prompt: Option<String>,
    /// Raw response payload. JSON for structured output, plain text
    /// otherwise; a failed call is recorded as `{"error": "..."}` here
    /// rather than in a separate status column.
    pub raw_json: String,
}

/// A compiled enrichment result ready to land in a source or derived table.
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    /// The audit-log `enrichment_id` this result was produced under.
    pub enrichment_id: String,
    /// Content-address key.
    pub sha1: String,
    /// Model that produced this result.
    pub model_used: String,
    /// Field name to parsed value.
    pub fields: BTreeMap<String, DynValue>,
}

/// Aggregate counters surfaced by `enrich status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Total audit-log rows.
    pub response_count: usize,
    /// Distinct enrichment names with at least one audit-log row.
    pub enrichment_count: usize,
    /// Distinct registered prompts.
    pub prompt_count: usize,
    /// Schema version.
    pub schema_version: u32,
    /// Database file size in bytes, when the database is not in-memory.
    pub db_size: Option<u64>,
}

/// One row of `enrich history` output.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    /// Content-address key.
    pub sha1: String,
    /// Enrichment name.
    pub enrichment_name: String,
    /// Model used.
    pub model_used: String,
    /// Whether this attempt succeeded, derived from whether `raw_json`
    /// carries a top-level `error` key rather than from a stored column.
    pub success: bool,
    /// Timestamp the row was written, as stored (`TEXT`, RFC 3339).
    pub created_at: String,
}

/// Persistence interface the Enrichment Engine, Cost Estimator, and CLI
/// drive the store through. Async so the engine's bounded task pool never
/// blocks its executor on SQLite I/O (implementations hand blocking work to
/// `spawn_blocking`).
#[async_trait]
pub trait Store: Send + Sync {
    /// Creates the store's own tables and runs pending migrations.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation or migration fails.
    async fn init(&self) -> Result<()>;

    /// Returns whether `init` has already been run.
    ///
    /// # Errors
    ///
    /// Returns an error if the check cannot be performed.
    async fn is_initialized(&self) -> Result<bool>;

    /// Looks up or registers a prompt, returning its Prompt Registry id.
    /// Upserts once per `(enrichment_name, hash)`.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    async fn register_prompt(
        &self,
        enrichment_name: &str,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String>;

    /// Returns whether an audit-log row already exists for this
    /// `(sha1, enrichment_name, model_used)` triple — the authoritative
    /// skip decision.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    async fn has_response(&self, sha1: &str, enrichment_name: &str, model_used: &str) -> Result<bool>;

    /// Appends one audit-log entry. Always called before any conditional
    /// write that depends on it.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    async fn append_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// Writes one enrichment result according to the resolved [`Strategy`]:
    /// a single column update in `direct_column` mode, or an upserted row
    /// in the derived table in `separate_table` mode.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure or if the strategy names a
    /// table/column the database does not recognize.
    async fn write_result(&self, strategy: &Strategy, result: &EnrichmentResult) -> Result<()>;

    /// Ensures the derived output table for a `separate_table` strategy
    /// exists, creating it if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    async fn ensure_output_table(&self, strategy: &Strategy) -> Result<()>;

    /// Runs the query planner's rewritten `SELECT`, returning every
    /// selected row along with its `rowid` and requested columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is malformed or references an unknown
    /// relation.
    async fn fetch_rows(&self, sql: &str, params: &[String]) -> Result<Vec<SourceRow>>;

    /// Fetches additional table-qualified input columns for a batch of
    /// `sha1` keys.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    async fn fetch_qualified_columns(
        &self,
        table: &str,
        key_column: &str,
        column: &str,
        keys: &[String],
    ) -> Result<BTreeMap<String, String>>;

    /// Issues a manual WAL checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    async fn checkpoint(&self) -> Result<()>;

    /// Aggregate counters for `enrich status`.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    async fn stats(&self) -> Result<StoreStats>;

    /// Distinct enrichment names with at least one audit-log row, for
    /// `enrich list-enrichments`.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    async fn known_enrichments(&self) -> Result<Vec<String>>;

    /// Looks up a registered prompt's text by id, for `enrich show-prompt`.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    async fn prompt_text(&self, prompt_id: &str) -> Result<Option<(String, Option<String>)>>;

    /// Recent audit-log rows, most recent first, for `enrich history`.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    async fn history(&self, enrichment_name: Option<&str>, limit: usize) -> Result<Vec<HistoryEntry>>;
}

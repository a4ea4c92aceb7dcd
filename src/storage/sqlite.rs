//! `SQLite`-backed [`Store`] implementation.
//!
//! `rusqlite::Connection` is `Send` but not `Sync` as of rusqlite 0.38, so
//! rather than the single shared connection plus `unsafe impl Sync` the
//! underlying store keeps a small fixed pool of connections: each checkout
//! is exclusive, bounded by a semaphore sized to the pool, and blocking
//! `SQLite` calls run on `spawn_blocking` so the async engine never stalls
//! its executor on disk I/O. See `DESIGN.md` for the rationale.

// SQLite stores all integers as i64; these casts are intentional and safe
// because every value we store or read back fits usize/u32/u64.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::error::{Error, Result, StorageError};
use crate::schema::DynValue;
use crate::storage::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL,
    get_migrations_from,
};
use crate::storage::traits::{AuditEntry, EnrichmentResult, HistoryEntry, SourceRow, Store, StoreStats};
use crate::strategy::{Strategy, StorageMode};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;
use uuid::Uuid;

/// Default number of pooled connections, matching the default DB-writer
/// concurrency bound.
pub const DEFAULT_POOL_SIZE: usize = 2;

const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(6),
];

/// A bounded pool of exclusive `SQLite` connections.
struct ConnectionPool {
    idle: StdMutex<Vec<Connection>>,
    semaphore: Semaphore,
}

impl ConnectionPool {
    fn new(connections: Vec<Connection>) -> Self {
        let size = connections.len();
        Self {
            idle: StdMutex::new(connections),
            semaphore: Semaphore::new(size),
        }
    }

    /// Runs a blocking closure against an exclusively checked-out
    /// connection, returning it to the pool afterward.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::InvalidState {
                message: "connection pool closed".to_string(),
            })?;

        let conn = {
            let mut idle = self.idle.lock().map_err(|_| Error::InvalidState {
                message: "connection pool mutex poisoned".to_string(),
            })?;
            idle.pop().ok_or_else(|| Error::InvalidState {
                message: "connection pool semaphore permit had no idle connection".to_string(),
            })?
        };

        let (result, conn) = tokio::task::spawn_blocking(move || {
            let result = f(&conn);
            (result, conn)
        })
        .await
        .map_err(|e| Error::InvalidState {
            message: format!("database worker task panicked: {e}"),
        })?;

        self.idle
            .lock()
            .map_err(|_| Error::InvalidState {
                message: "connection pool mutex poisoned".to_string(),
            })?
            .push(conn);
        drop(permit);
        result
    }

    /// Like [`Self::with_conn`], but retries on `SQLITE_BUSY`/`SQLITE_LOCKED`
    /// with the backoff schedule in [`RETRY_DELAYS`].
    async fn with_conn_retrying<F, T>(&self, f: F) -> Result<T>
    where
        F: Fn(&Connection) -> Result<T> + Send + Clone + 'static,
        T: Send + 'static,
    {
        let mut attempt = 0u32;
        loop {
            let f_clone = f.clone();
            match self.with_conn(move |conn| f_clone(conn)).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < RETRY_DELAYS.len() as u32 && is_busy(&err) => {
                    warn!(attempt, %err, "database busy, retrying");
                    tokio::time::sleep(RETRY_DELAYS[attempt as usize]).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(if is_busy(&err) {
                        Error::Storage(StorageError::RetriesExhausted {
                            attempts: attempt + 1,
                            source: err.to_string(),
                        })
                    } else {
                        err
                    });
                }
            }
        }
    }
}

fn is_busy(err: &Error) -> bool {
    matches!(err, Error::Storage(StorageError::Database(msg)) if msg.contains("database is locked") || msg.contains("database table is locked"))
}

/// Whether a stored `raw_json` audit payload represents a failed call —
/// per spec §7 a `ProviderError` is recorded as `{"error": "..."}`, not in
/// a separate status column.
fn response_is_error(raw_json: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(raw_json)
        .ok()
        .and_then(|v| v.as_object().map(|o| o.contains_key("error")))
        .unwrap_or(false)
}

fn open_connection(path: Option<&Path>) -> Result<Connection> {
    let conn = match path {
        Some(path) => Connection::open(path).map_err(StorageError::from)?,
        None => Connection::open_in_memory().map_err(StorageError::from)?,
    };
    conn.execute("PRAGMA foreign_keys = ON;", [])
        .map_err(StorageError::from)?;
    conn.busy_timeout(Duration::from_secs(30))
        .map_err(StorageError::from)?;
    if path.is_some() {
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StorageError::from)?;
    }
    conn.execute("PRAGMA synchronous = NORMAL;", [])
        .map_err(StorageError::from)?;
    Ok(conn)
}

/// `SQLite`-backed [`Store`].
pub struct SqliteStore {
    pool: ConnectionPool,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens or creates a database at `path`, with `pool_size` pooled
    /// connections.
    ///
    /// # Errors
    ///
    /// Returns an error if any connection cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, pool_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let connections = (0..pool_size.max(1))
            .map(|_| open_connection(Some(&path)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            pool: ConnectionPool::new(connections),
            path: Some(path),
        })
    }

    /// Opens an in-memory database, useful for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened.
    pub fn in_memory() -> Result<Self> {
        let conn = open_connection(None)?;
        Ok(Self {
            pool: ConnectionPool::new(vec![conn]),
            path: None,
        })
    }

    /// The database path, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs arbitrary SQL against the pool, for test/fixture setup of
    /// operator-owned source tables (the store itself never creates these,
    /// only its own prompts/audit/derived tables).
    ///
    /// # Errors
    ///
    /// Returns an error if the statement batch fails.
    pub async fn seed_sql(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.pool.with_conn(move |conn| conn.execute_batch(&sql).map_err(|e| StorageError::from(e).into())).await
    }

    fn output_table_create_sql(strategy: &Strategy, table: &str) -> String {
        let mut columns = String::new();
        for col in &strategy.output_columns {
            columns.push_str(&format!(", {col} TEXT"));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                id INTEGER PRIMARY KEY AUTOINCREMENT, \
                sha1 TEXT NOT NULL, \
                model_used TEXT NOT NULL, \
                enrichment_id TEXT{columns}, \
                created_at TEXT NOT NULL, \
                updated_at TEXT NOT NULL, \
                UNIQUE(sha1, model_used)\
            ); \
            CREATE INDEX IF NOT EXISTS idx_{table}_sha1 ON {table}(sha1); \
            CREATE INDEX IF NOT EXISTS idx_{table}_model ON {table}(model_used); \
            CREATE INDEX IF NOT EXISTS idx_{table}_triple ON {table}(sha1, model_used);"
        )
    }
}

/// Current timestamp as `TEXT`, matching `original_source/src/db_operations.py`'s
/// `datetime.now().isoformat()` default for every `created_at`/`updated_at`
/// column.
fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl Store for SqliteStore {
    async fn init(&self) -> Result<()> {
        self.pool
            .with_conn(|conn| {
                let is_init: i64 = conn
                    .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
                    .map_err(StorageError::from)?;
                if is_init == 0 {
                    conn.execute_batch(SCHEMA_SQL).map_err(StorageError::from)?;
                    conn.execute(SET_VERSION_SQL, [CURRENT_SCHEMA_VERSION.to_string()])
                        .map_err(StorageError::from)?;
                } else {
                    let current: Option<String> = conn
                        .query_row(GET_VERSION_SQL, [], |row| row.get(0))
                        .optional()
                        .map_err(StorageError::from)?;
                    let current: u32 = current.and_then(|v| v.parse().ok()).unwrap_or(0);
                    if current < CURRENT_SCHEMA_VERSION {
                        for migration in get_migrations_from(current) {
                            conn.execute_batch(migration.sql)
                                .map_err(|e| StorageError::Migration(e.to_string()))?;
                        }
                        conn.execute(SET_VERSION_SQL, [CURRENT_SCHEMA_VERSION.to_string()])
                            .map_err(StorageError::from)?;
                    }
                }
                Ok(())
            })
            .await
    }

    async fn is_initialized(&self) -> Result<bool> {
        self.pool
            .with_conn(|conn| {
                let count: i64 = conn
                    .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
                    .map_err(StorageError::from)?;
                Ok(count > 0)
            })
            .await
    }

    async fn register_prompt(
        &self,
        enrichment_name: &str,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String> {
        let prompt_hash = crate::prompt::content_hash(enrichment_name, prompt, system_prompt);
        let enrichment_name = enrichment_name.to_string();
        let prompt = prompt.to_string();
        let system_prompt = system_prompt.map(str::to_string);
        self.pool
            .with_conn(move |conn| {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT prompt_id FROM prompts WHERE enrichment_name = ?1 AND prompt_hash = ?2",
                        rusqlite::params![enrichment_name, prompt_hash],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(StorageError::from)?;
                if let Some(prompt_id) = existing {
                    return Ok(prompt_id);
                }
                let prompt_id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO prompts (prompt_id, enrichment_name, prompt_hash, prompt_text, system_prompt, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![prompt_id, enrichment_name, prompt_hash, prompt, system_prompt, now()],
                )
                .map_err(StorageError::from)?;
                Ok(prompt_id)
            })
            .await
    }

    async fn has_response(&self, sha1: &str, enrichment_name: &str, model_used: &str) -> Result<bool> {
        let sha1 = sha1.to_string();
        let enrichment_name = enrichment_name.to_string();
        let model_used = model_used.to_string();
        self.pool
            .with_conn(move |conn| {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM enrichment_responses \
                         WHERE sha1 = ?1 AND enrichment_name = ?2 AND model_used = ?3",
                        rusqlite::params![sha1, enrichment_name, model_used],
                        |row| row.get(0),
                    )
                    .map_err(StorageError::from)?;
                Ok(count > 0)
            })
            .await
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let entry = entry.clone();
        self.pool
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO enrichment_responses \
                     (enrichment_id, sha1, enrichment_name, model_used, prompt_id, full_prompt, raw_json, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        entry.enrichment_id,
                        entry.sha1,
                        entry.enrichment_name,
                        entry.model_used,
                        entry.prompt_id,
                        entry.full_prompt,
                        entry.raw_json,
                        now(),
                    ],
                )
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn write_result(&self, strategy: &Strategy, result: &EnrichmentResult) -> Result<()> {
        let strategy = strategy.clone();
        let result = result.clone();
        self.pool
            .with_conn_retrying(move |conn| match strategy.storage_mode {
                StorageMode::DirectColumn => write_direct_column(conn, &strategy, &result),
                StorageMode::SeparateTable => write_separate_table(conn, &strategy, &result),
            })
            .await
    }

    async fn ensure_output_table(&self, strategy: &Strategy) -> Result<()> {
        let Some(table) = strategy.output_table.clone() else {
            return Ok(());
        };
        let strategy = strategy.clone();
        self.pool
            .with_conn(move |conn| {
                conn.execute_batch(&SqliteStore::output_table_create_sql(&strategy, &table))
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn fetch_rows(&self, sql: &str, query_params: &[String]) -> Result<Vec<SourceRow>> {
        let sql = sql.to_string();
        let query_params = query_params.to_vec();
        self.pool
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&sql).map_err(StorageError::from)?;
                let column_names: Vec<String> = stmt
                    .column_names()
                    .iter()
                    .map(std::string::ToString::to_string)
                    .collect();
                let rows = stmt
                    .query_map(params_from_iter(query_params.iter()), |row| {
                        let rowid: i64 = row.get("rowid").unwrap_or(0);
                        let mut columns = BTreeMap::new();
                        let mut sha1 = String::new();
                        for (idx, name) in column_names.iter().enumerate() {
                            if name == "rowid" {
                                continue;
                            }
                            let value: Option<String> = row.get(idx)?;
                            let value = value.unwrap_or_default();
                            if name == "sha1" {
                                sha1.clone_from(&value);
                            }
                            columns.insert(name.clone(), value);
                        }
                        Ok(SourceRow { rowid, sha1, columns })
                    })
                    .map_err(StorageError::from)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| Error::Storage(StorageError::from(e)))
            })
            .await
    }

    async fn fetch_qualified_columns(
        &self,
        table: &str,
        key_column: &str,
        column: &str,
        keys: &[String],
    ) -> Result<BTreeMap<String, String>> {
        if keys.is_empty() {
            return Ok(BTreeMap::new());
        }
        let table = table.to_string();
        let key_column = key_column.to_string();
        let column = column.to_string();
        let keys = keys.to_vec();
        self.pool
            .with_conn(move |conn| {
                let placeholders = vec!["?"; keys.len()].join(", ");
                let sql = format!(
                    "SELECT {key_column}, {column} FROM {table} WHERE {key_column} IN ({placeholders})"
                );
                let mut stmt = conn.prepare(&sql).map_err(StorageError::from)?;
                let rows = stmt
                    .query_map(params_from_iter(keys.iter()), |row| {
                        let key: String = row.get(0)?;
                        let value: Option<String> = row.get(1)?;
                        Ok((key, value.unwrap_or_default()))
                    })
                    .map_err(StorageError::from)?;
                let mut out = BTreeMap::new();
                for row in rows {
                    let (key, value) = row.map_err(StorageError::from)?;
                    out.insert(key, value);
                }
                Ok(out)
            })
            .await
    }

    async fn checkpoint(&self) -> Result<()> {
        self.pool
            .with_conn(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn stats(&self) -> Result<StoreStats> {
        let db_path = self.path.clone();
        self.pool
            .with_conn(move |conn| {
                let response_count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM enrichment_responses", [], |row| row.get(0))
                    .map_err(StorageError::from)?;
                let enrichment_count: i64 = conn
                    .query_row(
                        "SELECT COUNT(DISTINCT enrichment_name) FROM enrichment_responses",
                        [],
                        |row| row.get(0),
                    )
                    .map_err(StorageError::from)?;
                let prompt_count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM prompts", [], |row| row.get(0))
                    .map_err(StorageError::from)?;
                let version: Option<String> = conn
                    .query_row(GET_VERSION_SQL, [], |row| row.get(0))
                    .optional()
                    .map_err(StorageError::from)?;
                let db_size = db_path.as_deref().and_then(|p| std::fs::metadata(p).ok()).map(|m| m.len());
                Ok(StoreStats {
                    response_count: response_count as usize,
                    enrichment_count: enrichment_count as usize,
                    prompt_count: prompt_count as usize,
                    schema_version: version.and_then(|v| v.parse().ok()).unwrap_or(0),
                    db_size,
                })
            })
            .await
    }

    async fn known_enrichments(&self) -> Result<Vec<String>> {
        self.pool
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare("SELECT DISTINCT enrichment_name FROM enrichment_responses ORDER BY enrichment_name")
                    .map_err(StorageError::from)?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))
                    .map_err(StorageError::from)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| Error::Storage(StorageError::from(e)))
            })
            .await
    }

    async fn prompt_text(&self, prompt_id: &str) -> Result<Option<(String, Option<String>)>> {
        let prompt_id = prompt_id.to_string();
        self.pool
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT prompt_text, system_prompt FROM prompts WHERE prompt_id = ?1",
                    [prompt_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| Error::Storage(StorageError::from(e)))
            })
            .await
    }

    async fn history(&self, enrichment_name: Option<&str>, limit: usize) -> Result<Vec<HistoryEntry>> {
        let enrichment_name = enrichment_name.map(str::to_string);
        self.pool
            .with_conn(move |conn| {
                let (sql, params): (&str, Vec<Box<dyn rusqlite::ToSql>>) = match &enrichment_name {
                    Some(name) => (
                        "SELECT sha1, enrichment_name, model_used, raw_json, created_at FROM enrichment_responses \
                         WHERE enrichment_name = ?1 ORDER BY created_at DESC LIMIT ?2",
                        vec![Box::new(name.clone()), Box::new(limit as i64)],
                    ),
                    None => (
                        "SELECT sha1, enrichment_name, model_used, raw_json, created_at FROM enrichment_responses \
                         ORDER BY created_at DESC LIMIT ?1",
                        vec![Box::new(limit as i64)],
                    ),
                };
                let mut stmt = conn.prepare(sql).map_err(StorageError::from)?;
                let rows = stmt
                    .query_map(params_from_iter(params.iter().map(std::convert::AsRef::as_ref)), |row| {
                        let raw_json: String = row.get(3)?;
                        Ok(HistoryEntry {
                            sha1: row.get(0)?,
                            enrichment_name: row.get(1)?,
                            model_used: row.get(2)?,
                            success: !response_is_error(&raw_json),
                            created_at: row.get(4)?,
                        })
                    })
                    .map_err(StorageError::from)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| Error::Storage(StorageError::from(e)))
            })
            .await
    }
}

fn write_direct_column(conn: &Connection, strategy: &Strategy, result: &EnrichmentResult) -> Result<()> {
    let column = strategy
        .output_columns
        .first()
        .ok_or_else(|| Error::Storage(StorageError::MissingRelation("no output column resolved".to_string())))?;
    let value = result
        .fields
        .values()
        .next()
        .map(DynValue::to_storage_text)
        .unwrap_or_default();
    ensure_column(conn, &strategy.input_table, column)?;
    ensure_column(conn, &strategy.input_table, "metadata_updated")?;
    let sql = format!(
        "UPDATE {table} SET {column} = ?1, metadata_updated = ?2 WHERE {key} = ?3",
        table = strategy.input_table,
        column = column,
        key = strategy.key_column,
    );
    conn.execute(&sql, rusqlite::params![value, now(), result.sha1])
        .map_err(StorageError::from)?;
    Ok(())
}

fn write_separate_table(conn: &Connection, strategy: &Strategy, result: &EnrichmentResult) -> Result<()> {
    let table = strategy
        .output_table
        .as_ref()
        .ok_or_else(|| Error::Storage(StorageError::MissingRelation("no output table resolved".to_string())))?;
    let mut columns = vec!["sha1".to_string(), "model_used".to_string(), "enrichment_id".to_string()];
    let mut placeholders = vec!["?1".to_string(), "?2".to_string(), "?3".to_string()];
    let mut values: Vec<String> = vec![result.sha1.clone(), result.model_used.clone(), result.enrichment_id.clone()];
    for (idx, field) in strategy.output_columns.iter().enumerate() {
        columns.push(field.clone());
        placeholders.push(format!("?{}", idx + 4));
        let value = result
            .fields
            .get(field)
            .map(DynValue::to_storage_text)
            .unwrap_or_default();
        values.push(value);
    }
    let mut update_clause = strategy
        .output_columns
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    update_clause.push_str(", enrichment_id = excluded.enrichment_id, updated_at = excluded.updated_at");
    let ts = now();
    let created_placeholder = placeholders.len() + 1;
    let updated_placeholder = placeholders.len() + 2;
    values.push(ts.clone());
    values.push(ts);
    let sql = format!(
        "INSERT INTO {table} ({cols}, created_at, updated_at) VALUES ({placeholders}, ?{created_placeholder}, ?{updated_placeholder}) \
         ON CONFLICT(sha1, model_used) DO UPDATE SET {update_clause}",
        cols = columns.join(", "),
        placeholders = placeholders.join(", "),
    );
    conn.execute(&sql, params_from_iter(values.iter()))
        .map_err(StorageError::from)?;
    Ok(())
}

/// Adds `column` to `table` as `TEXT` if it does not already exist. Derived
/// output tables are created with all their columns up front; this only
/// matters for `direct_column` mode writing into operator-owned tables.
fn ensure_column(conn: &Connection, table: &str, column: &str) -> Result<()> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(StorageError::from)?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(StorageError::from)?
        .filter_map(std::result::Result::ok)
        .any(|name| name == column);
    if !exists {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} TEXT"), [])
            .map_err(StorageError::from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CompiledField, CompiledSchema, FieldType, ScalarKind};
    use crate::strategy::InputColumn;

    fn schema_one_field(name: &str) -> CompiledSchema {
        CompiledSchema {
            fields: vec![CompiledField {
                name: name.to_string(),
                ty: FieldType::Scalar(ScalarKind::String),
                lang: None,
                convert: None,
                description: None,
                max_length: None,
                minimum: None,
                maximum: None,
            }],
        }
    }

    fn direct_strategy(table: &str, column: &str) -> Strategy {
        Strategy {
            input_table: table.to_string(),
            input_columns: vec![InputColumn {
                table: None,
                column: "raw_content".to_string(),
                char_limit: None,
            }],
            storage_mode: StorageMode::DirectColumn,
            output_table: None,
            output_columns: vec![column.to_string()],
            key_column: "sha1".to_string(),
            models: vec!["gpt-4o-mini".to_string()],
            compiled_schema: schema_one_field(column),
        }
    }

    async fn seeded_store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.init().await.unwrap();
        store
            .pool
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TABLE documents (sha1 TEXT PRIMARY KEY, raw_content TEXT);\
                     INSERT INTO documents (sha1, raw_content) VALUES ('abc123', 'hello world');",
                )
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        store.init().await.unwrap();
        store.init().await.unwrap();
        assert!(store.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn register_prompt_is_stable_for_identical_content() {
        let store = SqliteStore::in_memory().unwrap();
        store.init().await.unwrap();
        let id_a = store.register_prompt("sentiment", "classify {x}", None).await.unwrap();
        let id_b = store.register_prompt("sentiment", "classify {x}", None).await.unwrap();
        assert_eq!(id_a, id_b);
    }

    #[tokio::test]
    async fn register_prompt_differs_by_enrichment_name() {
        let store = SqliteStore::in_memory().unwrap();
        store.init().await.unwrap();
        let id_a = store.register_prompt("sentiment", "classify {x}", None).await.unwrap();
        let id_b = store.register_prompt("other", "classify {x}", None).await.unwrap();
        assert_ne!(id_a, id_b);
    }

    #[tokio::test]
    async fn has_response_reflects_audit_log_presence() {
        let store = SqliteStore::in_memory().unwrap();
        store.init().await.unwrap();
        assert!(!store.has_response("abc", "sentiment", "gpt-4o-mini").await.unwrap());
        store
            .append_audit(&AuditEntry {
                enrichment_id: "e1".to_string(),
                sha1: "abc".to_string(),
                enrichment_name: "sentiment".to_string(),
                model_used: "gpt-4o-mini".to_string(),
                prompt_id: "p1".to_string(),
                full_prompt: None,
                raw_json: "{}".to_string(),
            })
            .await
            .unwrap();
        assert!(store.has_response("abc", "sentiment", "gpt-4o-mini").await.unwrap());
    }

    #[tokio::test]
    async fn write_result_direct_column_updates_source_row() {
        let store = seeded_store().await;
        let strategy = direct_strategy("documents", "sentiment");
        let mut fields = BTreeMap::new();
        fields.insert("sentiment".to_string(), DynValue::Str("positive".to_string()));
        store
            .write_result(
                &strategy,
                &EnrichmentResult {
                    enrichment_id: "e1".to_string(),
                    sha1: "abc123".to_string(),
                    model_used: "gpt-4o-mini".to_string(),
                    fields,
                },
            )
            .await
            .unwrap();
        let value: String = store
            .pool
            .with_conn(|conn| {
                conn.query_row("SELECT sentiment FROM documents WHERE sha1 = 'abc123'", [], |r| r.get(0))
                    .map_err(|e| Error::Storage(StorageError::from(e)))
            })
            .await
            .unwrap();
        assert_eq!(value, "positive");
    }

    #[tokio::test]
    async fn write_result_separate_table_upserts_on_conflict() {
        let store = seeded_store().await;
        let mut strategy = direct_strategy("documents", "sentiment");
        strategy.storage_mode = StorageMode::SeparateTable;
        strategy.output_table = Some("sentiment_analysis".to_string());
        store.ensure_output_table(&strategy).await.unwrap();

        for value in ["positive", "negative"] {
            let mut fields = BTreeMap::new();
            fields.insert("sentiment".to_string(), DynValue::Str(value.to_string()));
            store
                .write_result(
                    &strategy,
                    &EnrichmentResult {
                        enrichment_id: "e1".to_string(),
                        sha1: "abc123".to_string(),
                        model_used: "gpt-4o-mini".to_string(),
                        fields,
                    },
                )
                .await
                .unwrap();
        }

        let count: i64 = store
            .pool
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM sentiment_analysis", [], |r| r.get(0))
                    .map_err(|e| Error::Storage(StorageError::from(e)))
            })
            .await
            .unwrap();
        assert_eq!(count, 1, "upsert must not duplicate rows for the same (sha1, model_used)");
    }

    #[tokio::test]
    async fn fetch_rows_returns_rowid_and_columns() {
        let store = seeded_store().await;
        let rows = store
            .fetch_rows("SELECT rowid, sha1, raw_content FROM documents", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sha1, "abc123");
        assert_eq!(rows[0].columns.get("raw_content").unwrap(), "hello world");
    }

    #[tokio::test]
    async fn stats_reports_zero_on_fresh_store() {
        let store = SqliteStore::in_memory().unwrap();
        store.init().await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.response_count, 0);
        assert_eq!(stats.prompt_count, 0);
    }
}

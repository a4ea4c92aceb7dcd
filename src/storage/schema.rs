//! Database schema definitions.
//!
//! The store owns three tables outright: `schema_info` (version tracking),
//! `prompts` (the Prompt Registry), and `enrichment_responses` (the
//! append-only audit log). Source tables (e.g. `documents`) are the
//! operator's own data and are never created here; derived output tables
//! for `separate_table` enrichments are created on demand by the store.

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// SQL schema for initial database setup (fresh databases land directly on
/// [`CURRENT_SCHEMA_VERSION`]'s shape; upgraders go through [`MIGRATIONS`]).
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Prompt Registry: one row per distinct (enrichment_name, prompt_hash).
CREATE TABLE IF NOT EXISTS prompts (
    prompt_id TEXT PRIMARY KEY,
    enrichment_name TEXT NOT NULL,
    prompt_text TEXT NOT NULL,
    system_prompt TEXT,
    prompt_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (enrichment_name, prompt_hash)
);

-- Audit log. Deliberately no uniqueness constraint on
-- (sha1, enrichment_name, model_used): retries append rather than replace,
-- and presence of any row is what makes the skip decision authoritative.
-- enrichment_id links this row to whatever projected write it produced.
-- A failed call is recorded the same way as a successful one: raw_json
-- carries `{"error": "..."}` rather than a separate status column.
CREATE TABLE IF NOT EXISTS enrichment_responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    enrichment_id TEXT NOT NULL,
    sha1 TEXT NOT NULL,
    enrichment_name TEXT NOT NULL,
    model_used TEXT NOT NULL,
    prompt_id TEXT NOT NULL,
    full_prompt TEXT,
    raw_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_responses_sha1 ON enrichment_responses(sha1);
CREATE INDEX IF NOT EXISTS idx_responses_enrichment ON enrichment_responses(enrichment_name);
CREATE INDEX IF NOT EXISTS idx_responses_created_at ON enrichment_responses(created_at);
CREATE INDEX IF NOT EXISTS idx_responses_triple
    ON enrichment_responses(sha1, enrichment_name, model_used);

-- Extensibility key/value store (teacher precedent); used here to persist
-- the last WAL checkpoint row-count watermark.
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// SQL to check if schema is initialized.
pub const CHECK_SCHEMA_SQL: &str = r"
SELECT COUNT(*) FROM sqlite_master
WHERE type='table' AND name='schema_info';
";

/// SQL to get schema version.
pub const GET_VERSION_SQL: &str = r"
SELECT value FROM schema_info WHERE key = 'version';
";

/// SQL to set schema version.
pub const SET_VERSION_SQL: &str = r"
INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?);
";

/// A schema migration step.
pub struct Migration {
    /// Version this migration upgrades from.
    pub from_version: u32,
    /// Version this migration upgrades to.
    pub to_version: u32,
    /// SQL statements to execute.
    pub sql: &'static str,
}

/// Upgrades a v1 database (no `enrichment_id`/`full_prompt` columns, and
/// possibly carrying the old source tool's uniqueness constraint on
/// `(sha1, enrichment_name[, model_used])`) to v2. `enrichment_id` backfills
/// with a fresh value per pre-existing row: those rows predate per-call
/// linkage but must not violate the `NOT NULL` constraint going forward.
/// Mirrors `original_source/src/db_operations.py::ensure_enrichment_responses_table`'s
/// migration branch, which rebuilds the table via `ALTER TABLE ... RENAME TO`
/// plus a fresh `CREATE TABLE` when the legacy unique index is present; the
/// v1 shape already used `raw_json`/TEXT timestamps, so only the
/// `enrichment_id`/`full_prompt` columns are new here.
const V1_TO_V2_SQL: &str = r"
ALTER TABLE enrichment_responses RENAME TO enrichment_responses_v1;

CREATE TABLE enrichment_responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    enrichment_id TEXT NOT NULL,
    sha1 TEXT NOT NULL,
    enrichment_name TEXT NOT NULL,
    model_used TEXT NOT NULL,
    prompt_id TEXT NOT NULL,
    full_prompt TEXT,
    raw_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

INSERT INTO enrichment_responses
    (id, enrichment_id, sha1, enrichment_name, model_used, prompt_id, full_prompt, raw_json, created_at)
SELECT
    id,
    lower(hex(randomblob(16))),
    sha1, enrichment_name, model_used, prompt_id, NULL, raw_json, created_at
FROM enrichment_responses_v1;

DROP TABLE enrichment_responses_v1;

CREATE INDEX IF NOT EXISTS idx_responses_sha1 ON enrichment_responses(sha1);
CREATE INDEX IF NOT EXISTS idx_responses_enrichment ON enrichment_responses(enrichment_name);
CREATE INDEX IF NOT EXISTS idx_responses_created_at ON enrichment_responses(created_at);
CREATE INDEX IF NOT EXISTS idx_responses_triple
    ON enrichment_responses(sha1, enrichment_name, model_used);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Migrations applied in order when upgrading from an older
/// `schema_info` version.
pub const MIGRATIONS: &[Migration] = &[Migration {
    from_version: 1,
    to_version: 2,
    sql: V1_TO_V2_SQL,
}];

/// Gets migrations needed to upgrade from a version, in application order.
/// A migration applies whenever it carries the database further than
/// `current_version` already is — so an unversioned (`0`) database picks up
/// every migration, and a database already past a given step skips it.
#[must_use]
pub fn get_migrations_from(current_version: u32) -> Vec<&'static Migration> {
    MIGRATIONS.iter().filter(|m| m.to_version > current_version).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_sql_creates_expected_tables() {
        assert!(SCHEMA_SQL.contains("CREATE TABLE IF NOT EXISTS prompts"));
        assert!(SCHEMA_SQL.contains("CREATE TABLE IF NOT EXISTS enrichment_responses"));
        assert!(!SCHEMA_SQL.contains("UNIQUE (sha1, enrichment_name, model_used)"));
    }

    #[test]
    fn get_migrations_from_unversioned_applies_everything() {
        assert_eq!(get_migrations_from(0).len(), MIGRATIONS.len());
    }

    #[test]
    fn get_migrations_from_current_version_is_empty() {
        assert!(get_migrations_from(CURRENT_SCHEMA_VERSION).is_empty());
    }
}

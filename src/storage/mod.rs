//! Storage layer: the content-addressed document store, audit log,
//! and Prompt Registry all live behind the [`Store`] trait.

pub mod schema;
pub mod sqlite;
pub mod traits;

pub use schema::CURRENT_SCHEMA_VERSION;
pub use sqlite::{DEFAULT_POOL_SIZE, SqliteStore};
pub use traits::{AuditEntry, EnrichmentResult, HistoryEntry, SourceRow, Store, StoreStats};

/// Default database file name.
pub const DEFAULT_DB_NAME: &str = "enrich.db";

//! Error types for the enrichment engine.
//!
//! A `thiserror`-based hierarchy: one top-level `Error` aggregating a
//! per-domain error enum for each of the pipeline's components.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type returned by public crate APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage-related errors (database operations).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Schema compilation or validation errors.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Strategy resolution errors.
    #[error("strategy error: {0}")]
    Strategy(#[from] StrategyError),

    /// Query planning errors.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Provider adapter errors.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Enrichment engine errors.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Invalid state errors.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the invalid state.
        message: String,
    },

    /// Configuration errors. Fatal at task start.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

/// Storage-specific errors for database operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Store not initialized (`init` command not run).
    #[error("store not initialized. Run: enrich init")]
    NotInitialized,

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A requested table or column does not exist.
    #[error("no such table or column: {0}")]
    MissingRelation(String),

    /// Exhausted retries against a transient lock/busy error.
    #[error("database busy after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Underlying database error.
        source: String,
    },
}

/// Schema Compiler errors.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Unknown scalar/field type tag.
    #[error("unknown field type: {0}")]
    UnknownType(String),

    /// Enum schema declared with zero choices.
    #[error("enum field '{field}' has no choices")]
    EmptyEnum {
        /// Field name.
        field: String,
    },

    /// A value did not parse as the declared scalar type.
    #[error("field '{field}' expected {expected}, got {actual}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Expected type name.
        expected: String,
        /// Description of what was actually received.
        actual: String,
    },

    /// A value was not among the enum's closed set.
    #[error("field '{field}' value '{value}' is not one of the allowed choices")]
    NotInEnum {
        /// Field name.
        field: String,
        /// Offending value.
        value: String,
    },

    /// `enum_list` violated its `min_items`/`max_items` bound after dedupe.
    #[error("field '{field}' has {actual} items after dedupe, outside bound [{min}, {max}]")]
    ItemCountOutOfBounds {
        /// Field name.
        field: String,
        /// Item count after dedupe.
        actual: usize,
        /// Minimum allowed.
        min: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// A string field exceeded its declared `max_length`.
    #[error("field '{field}' exceeds max_length {max_length}")]
    TooLong {
        /// Field name.
        field: String,
        /// Declared bound.
        max_length: usize,
    },

    /// A numeric field violated its `minimum`/`maximum` bound.
    #[error("field '{field}' value {value} outside bound [{min}, {max}]")]
    NumberOutOfBounds {
        /// Field name.
        field: String,
        /// Offending value.
        value: f64,
        /// Minimum allowed.
        min: f64,
        /// Maximum allowed.
        max: f64,
    },

    /// A registered `convert` transform is unknown.
    #[error("unknown convert transform: {0}")]
    UnknownConvert(String),

    /// A `convert` transform failed to produce a value.
    #[error("convert transform '{transform}' failed for field '{field}': {reason}")]
    ConvertFailed {
        /// Transform name.
        transform: String,
        /// Field name.
        field: String,
        /// Failure detail.
        reason: String,
    },

    /// `lang: zh` required CJK ideographs and found none, or `lang: en`
    /// forbade them and found some. Recoverable: retried up
    /// to 2 additional times before being surfaced.
    #[error("field '{field}' failed language check ({lang}): {reason}")]
    LanguageValidation {
        /// Field name.
        field: String,
        /// Expected language tag (`zh` or `en`).
        lang: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// The provider's raw response did not parse as JSON.
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
}

impl SchemaError {
    /// Whether this error is recoverable by retrying the provider call.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::LanguageValidation { .. })
    }
}

/// Strategy Resolver errors.
#[derive(Error, Debug)]
pub enum StrategyError {
    /// Enrichment config has no schema.
    #[error("enrichment '{name}' has no schema")]
    MissingSchema {
        /// Enrichment name.
        name: String,
    },

    /// A complex (multi-field) schema was declared without an `output_table`.
    #[error("enrichment '{name}' has a multi-field schema but no output_table")]
    ComplexSchemaNeedsTable {
        /// Enrichment name.
        name: String,
    },

    /// Multiple models were declared without an `output_table`.
    #[error("enrichment '{name}' declares multiple models but no output_table")]
    MultiModelNeedsTable {
        /// Enrichment name.
        name: String,
    },

    /// `output_columns` did not match the schema field count in
    /// `direct_column` mode (exactly one is required).
    #[error("direct_column mode requires exactly one output column, got {count}")]
    WrongColumnCount {
        /// Actual column count.
        count: usize,
    },

    /// A malformed `input_columns` entry (bad char-limit or qualifier).
    #[error("malformed input column spec: {0}")]
    MalformedInputColumn(String),
}

/// Query Planner errors.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The underlying statement referenced a table/column that does not
    /// exist. Rewritten with operator guidance.
    #[error("{message} (check table/column names, or run ingest first)")]
    MissingRelation {
        /// Underlying detail.
        message: String,
    },

    /// A named stored query was not found in `sql_queries`.
    #[error("unknown stored query: {0}")]
    UnknownStoredQuery(String),

    /// More than one of `--limit`, `--rowid`, `--sha1` was supplied.
    #[error("--limit, --rowid, and --sha1 are mutually exclusive")]
    ConflictingRowSelector,
}

/// Provider Adapter errors.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No API credentials were available for the selected model's backend.
    #[error("missing API credentials for provider: {0}")]
    MissingCredentials(String),

    /// Transport or HTTP-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend returned a non-success API response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP or provider-specific status code.
        status: u16,
        /// Message from the backend.
        message: String,
    },

    /// An unrecognized model name (no context-limit/pricing entry).
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The prompt alone exceeds the model's context window, or exceeds it
    /// even after truncation was attempted. Fatal for the affected row.
    #[error("prompt exceeds model context window ({tokens} tokens > {limit})")]
    ContextExceeded {
        /// Estimated token count.
        tokens: usize,
        /// Model's context limit.
        limit: usize,
    },
}

/// Enrichment Engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The run was cancelled (e.g. SIGINT) before completion.
    #[error("enrichment run cancelled")]
    Cancelled,

    /// The interactive cost confirmation was declined.
    #[error("cost confirmation declined (estimated ${estimated:.2} > threshold ${threshold:.2})")]
    CostConfirmationDeclined {
        /// Estimated total cost in USD.
        estimated: f64,
        /// Confirmation threshold in USD.
        threshold: f64,
    },
}

/// CLI command-specific errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Unknown command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArgument(String),

    /// Command execution failed.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    /// User cancelled the operation (SIGINT, exit code 130).
    #[error("operation cancelled by user")]
    Cancelled,

    /// Output format error.
    #[error("output format error: {0}")]
    OutputFormat(String),
}

// ==================== std/third-party conversions ====================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::InvalidState {
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::from(err))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(StorageError::Serialization(err.to_string()))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

impl From<regex::Error> for QueryError {
    fn from(err: regex::Error) -> Self {
        Self::MissingRelation {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_state() {
        let err = Error::InvalidState {
            message: "test error".to_string(),
        };
        assert_eq!(err.to_string(), "invalid state: test error");
    }

    #[test]
    fn storage_error_display() {
        let err = StorageError::NotInitialized;
        assert_eq!(err.to_string(), "store not initialized. Run: enrich init");
    }

    #[test]
    fn schema_error_recoverability() {
        let recoverable = SchemaError::LanguageValidation {
            field: "summary_zh".into(),
            lang: "zh".into(),
            reason: "no CJK ideographs found".into(),
        };
        assert!(recoverable.is_recoverable());

        let not_recoverable = SchemaError::NotInEnum {
            field: "sentiment".into(),
            value: "mixed".into(),
        };
        assert!(!not_recoverable.is_recoverable());
    }

    #[test]
    fn strategy_error_display() {
        let err = StrategyError::ComplexSchemaNeedsTable {
            name: "analysis".into(),
        };
        assert!(err.to_string().contains("analysis"));
        assert!(err.to_string().contains("output_table"));
    }

    #[test]
    fn command_error_display() {
        let err = CommandError::MissingArgument("--config".to_string());
        assert_eq!(err.to_string(), "missing required argument: --config");
    }

    #[test]
    fn error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: Error = rusqlite_err.into();
        assert!(matches!(err, Error::Storage(StorageError::Database(_))));
    }

    #[test]
    fn error_from_serde_json() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Storage(StorageError::Serialization(_))));
    }

    #[test]
    fn provider_error_context_exceeded_display() {
        let err = ProviderError::ContextExceeded {
            tokens: 9000,
            limit: 8192,
        };
        assert!(err.to_string().contains("9000"));
        assert!(err.to_string().contains("8192"));
    }

    #[test]
    fn engine_error_cost_declined_display() {
        let err = EngineError::CostConfirmationDeclined {
            estimated: 12.5,
            threshold: 5.0,
        };
        assert!(err.to_string().contains("12.50"));
        assert!(err.to_string().contains("5.00"));
    }
}

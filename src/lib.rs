//! # enrich-rs
//!
//! A document enrichment pipeline built around a local content-addressed
//! `SQLite` store. Given a YAML configuration that declares SQL row
//! selections, prompt templates, input column slicing, output schemas, and
//! storage targets, the engine drives concurrent per-row LLM calls,
//! validates and coerces structured responses, and persists both a raw
//! audit record and the parsed/projected values under an
//! at-most-once-per-key discipline. Runs are idempotent and resumable.
//!
//! ## Components
//!
//! - [`schema`] — compiles a declarative schema into a runtime validator
//!   and a provider-neutral wire contract.
//! - [`strategy`] — resolves an enrichment config into an immutable storage
//!   plan.
//! - [`query`] — rewrites a configured `SELECT` into the statement the
//!   engine actually runs.
//! - [`storage`] — the transactional `SQLite`-backed store: prompts, audit
//!   log, derived tables, migrations.
//! - [`provider`] — a uniform interface over LLM backends (OpenAI, Gemini).
//! - [`engine`] — the orchestrator: bounded concurrency, retries, durable
//!   per-row writes.
//! - [`cost`] — pre-flight cost estimation.
//! - [`prompt`] — prompt-identity hashing for the Prompt Registry.
//! - [`cli`] — the `enrich` binary's command surface.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod cli;
pub mod config;
pub mod cost;
pub mod engine;
pub mod error;
pub mod io;
pub mod logging;
pub mod prompt;
pub mod provider;
pub mod query;
pub mod schema;
pub mod storage;
pub mod strategy;

// Re-export commonly used types at crate root.
pub use error::{Error, Result};

// Re-export config types.
pub use config::{Config, EnrichmentConfig, ModelSelector};

// Re-export schema types.
pub use schema::{CompiledSchema, DynValue, Validator, WireSchema};

// Re-export strategy types.
pub use strategy::{Strategy, StorageMode};

// Re-export storage types.
pub use storage::{SqliteStore, Store, StoreStats};

// Re-export provider types.
pub use provider::{Provider, ProviderRegistry};

// Re-export engine types.
pub use engine::{EngineOptions, RunSummary, run_enrichment};

// Re-export CLI types.
pub use cli::{Cli, Commands, execute};

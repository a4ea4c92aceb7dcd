//! Configuration loading.
//!
//! Deserializes the hierarchical YAML config file and applies
//! defaults the way `original_source/src/config/config_manager.py` does:
//! parse first, then collect every validation problem rather than failing
//! on the first one, so operators see the whole list of config mistakes in
//! one pass.

use crate::error::Error;
use crate::schema::RawSchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Per-model generation defaults (`models:` top-level key).
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// Maximum tokens requested in a completion.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// `input: { query, input_columns }`.
#[derive(Debug, Clone, Deserialize)]
pub struct InputSpec {
    /// Either a named stored query (`sql_queries` key) or raw SQL.
    pub query: String,
    /// Column references, each optionally `col:N` and/or `table.col`.
    #[serde(default)]
    pub input_columns: Vec<String>,
}

/// One `model` declaration: a single name or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ModelSelector {
    /// A single model name.
    One(String),
    /// Multiple models; the engine runs one pass per model.
    Many(Vec<String>),
}

impl ModelSelector {
    /// Normalizes to a non-empty list of model names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::One(name) => vec![name.clone()],
            Self::Many(names) => names.clone(),
        }
    }
}

/// One enrichment task declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    /// Unique name within the run.
    pub name: String,
    /// Human-readable description, ignored by the engine.
    #[serde(default)]
    pub description: Option<String>,
    /// Format-string prompt template with `{col}` placeholders.
    pub prompt: String,
    /// Optional system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Literal text appended to the prompt after substitution.
    #[serde(default)]
    pub append_file: Option<String>,
    /// Row selection and input columns.
    pub input: InputSpec,
    /// Declarative output schema.
    #[serde(default)]
    pub schema: RawSchema,
    /// Single output column (direct_column mode).
    #[serde(default)]
    pub output_column: Option<String>,
    /// Explicit multi-column list (rare; usually schema-derived).
    #[serde(default)]
    pub output_columns: Option<Vec<String>>,
    /// Derived table name (separate_table mode).
    #[serde(default)]
    pub output_table: Option<String>,
    /// Join key column on the source table, default `sha1`.
    #[serde(default = "default_key_column")]
    pub key_column: String,
    /// Model name(s) to run this enrichment against.
    pub model: ModelSelector,
    /// Source table override (defaults to the run's `default_table`).
    #[serde(default)]
    pub table: Option<String>,
    /// Per-enrichment truncation opt-in, overriding the run-level flag.
    #[serde(default)]
    pub truncate: Option<bool>,
}

fn default_key_column() -> String {
    "sha1".to_string()
}

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Filesystem path to the `SQLite` database.
    pub database: String,
    /// Default source table used when an enrichment omits `table`.
    pub default_table: String,
    /// Default model used when an enrichment's selector is empty (should
    /// not occur given `model` is required, kept for forward-compat).
    #[serde(default)]
    pub default_model: Option<String>,
    /// Named stored queries referenced by `input.query`.
    #[serde(default)]
    pub sql_queries: BTreeMap<String, String>,
    /// Per-model generation settings.
    #[serde(default)]
    pub models: BTreeMap<String, ModelSettings>,
    /// The enrichment tasks this run may execute.
    pub enrichments: Vec<EnrichmentConfig>,
}

impl Config {
    /// Loads and parses a YAML config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("reading {}: {e}", path.display()),
        })?;
        let config: Self = serde_yaml::from_str(&text)?;
        Ok(config)
    }

    /// Looks up an enrichment by name.
    #[must_use]
    pub fn enrichment(&self, name: &str) -> Option<&EnrichmentConfig> {
        self.enrichments.iter().find(|e| e.name == name)
    }

    /// Resolves the SQL text for an enrichment's `input.query`: if it names
    /// a stored query, substitutes its text; otherwise treats the value as
    /// raw SQL.
    #[must_use]
    pub fn resolve_query_text<'a>(&'a self, query: &'a str) -> &'a str {
        self.sql_queries.get(query).map_or(query, String::as_str)
    }

    /// Validates every enrichment's cross-field constraints, collecting all
    /// problems rather than stopping at the first (mirrors
    /// `config_manager.py`'s "collect all errors, report together").
    ///
    /// # Errors
    ///
    /// Returns the joined list of validation messages as a single
    /// [`Error::Config`] when any enrichment is invalid.
    pub fn validate(&self) -> Result<(), Error> {
        let mut problems = Vec::new();
        let mut seen_names = std::collections::HashSet::new();

        for enrichment in &self.enrichments {
            if !seen_names.insert(enrichment.name.as_str()) {
                problems.push(format!("duplicate enrichment name: {}", enrichment.name));
            }
            if enrichment.schema.is_empty() {
                problems.push(format!("enrichment '{}' has no schema", enrichment.name));
            }
            for model in enrichment.model.names() {
                if !self.models.contains_key(&model) && !model.contains('/') {
                    // Unknown models are allowed through to the provider
                    // adapter, which owns the authoritative model registry;
                    // this only flags the common typo case of an empty name.
                    if model.trim().is_empty() {
                        problems.push(format!("enrichment '{}' has a blank model name", enrichment.name));
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Config {
                message: problems.join("; "),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
database: ./data.db
default_table: documents
sql_queries:
  recent: SELECT * FROM documents WHERE created_at > '2024-01-01'
models:
  gpt-4o-mini:
    max_tokens: 1000
    temperature: 0.2
enrichments:
  - name: sentiment
    prompt: 'Classify: {raw_content}'
    input:
      query: recent
      input_columns: [raw_content]
    schema:
      sentiment:
        enum: [positive, negative, neutral]
    output_column: sentiment
    model: gpt-4o-mini
";

    #[test]
    fn parses_sample_config() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.enrichments.len(), 1);
        assert_eq!(config.enrichments[0].model.names(), vec!["gpt-4o-mini"]);
    }

    #[test]
    fn resolves_stored_query_by_name() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        assert!(config.resolve_query_text("recent").contains("SELECT"));
        assert_eq!(config.resolve_query_text("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn validate_flags_duplicate_names() {
        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        let dup = config.enrichments[0].clone();
        config.enrichments.push(dup);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn model_selector_normalizes_single_and_many() {
        let one: ModelSelector = serde_yaml::from_str("gpt-4o-mini").unwrap();
        assert_eq!(one.names(), vec!["gpt-4o-mini"]);
        let many: ModelSelector = serde_yaml::from_str("[a, b]").unwrap();
        assert_eq!(many.names(), vec!["a", "b"]);
    }
}

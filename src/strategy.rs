//! Strategy Resolver.
//!
//! Turns an [`EnrichmentConfig`] plus its compiled schema into an immutable
//! [`Strategy`]: the resolved storage mode, column list, and per-column
//! parsing needed by the Query Planner and Enrichment Engine.

use crate::config::EnrichmentConfig;
use crate::error::StrategyError;
use crate::schema::CompiledSchema;

/// Where an enrichment's results are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// A single column on the source table.
    DirectColumn,
    /// A distinct table keyed by `(sha1, model_used)`.
    SeparateTable,
}

/// One parsed `input_columns` entry: a column reference with an optional
/// character limit and/or table qualifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputColumn {
    /// Table this column belongs to, when qualified as `table.col`. `None`
    /// means the primary input table.
    pub table: Option<String>,
    /// Bare column name.
    pub column: String,
    /// Character limit, when the entry carried a `col:N` suffix.
    pub char_limit: Option<usize>,
}

impl InputColumn {
    /// Parses one `input_columns` entry: `col`, `col:N`, `table.col`, or
    /// `table.col:N`.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::MalformedInputColumn`] if the `:N` suffix
    /// is present but not a positive integer.
    pub fn parse(spec: &str) -> Result<Self, StrategyError> {
        let (name_part, limit_part) = match spec.split_once(':') {
            Some((name, limit)) => (name, Some(limit)),
            None => (spec, None),
        };

        let char_limit = limit_part
            .map(|l| {
                l.parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                    StrategyError::MalformedInputColumn(spec.to_string())
                })
            })
            .transpose()?;

        let (table, column) = match name_part.split_once('.') {
            Some((t, c)) => (Some(t.to_string()), c.to_string()),
            None => (None, name_part.to_string()),
        };

        if column.is_empty() {
            return Err(StrategyError::MalformedInputColumn(spec.to_string()));
        }

        Ok(Self {
            table,
            column,
            char_limit,
        })
    }
}

/// The resolved, immutable plan for one enrichment.
#[derive(Debug, Clone)]
pub struct Strategy {
    /// Source table the row selection reads from.
    pub input_table: String,
    /// Parsed input column references.
    pub input_columns: Vec<InputColumn>,
    /// Where results land.
    pub storage_mode: StorageMode,
    /// Derived table name, set only in `SeparateTable` mode.
    pub output_table: Option<String>,
    /// Output column name(s): exactly one in `DirectColumn` mode, schema
    /// field names in `SeparateTable` mode.
    pub output_columns: Vec<String>,
    /// Join key column, default `sha1`.
    pub key_column: String,
    /// Model names this enrichment runs against.
    pub models: Vec<String>,
    /// The compiled schema driving structured output and storage.
    pub compiled_schema: CompiledSchema,
}

/// Resolves an enrichment's [`Strategy`].
///
/// # Errors
///
/// Returns a [`StrategyError`] if the config violates any resolver rule.
pub fn resolve(
    config: &EnrichmentConfig,
    default_table: &str,
    compiled_schema: CompiledSchema,
) -> Result<Strategy, StrategyError> {
    let models = config.model.names();
    let is_complex = compiled_schema.is_complex();
    let is_multi_model = models.len() > 1;

    let (storage_mode, output_table, output_columns) = if let Some(table) = &config.output_table {
        let columns = compiled_schema
            .fields
            .iter()
            .map(|f| f.name.clone())
            .collect();
        (StorageMode::SeparateTable, Some(table.clone()), columns)
    } else {
        if is_complex {
            return Err(StrategyError::ComplexSchemaNeedsTable {
                name: config.name.clone(),
            });
        }
        if is_multi_model {
            return Err(StrategyError::MultiModelNeedsTable {
                name: config.name.clone(),
            });
        }
        let column = config.output_column.clone().or_else(|| {
            compiled_schema.single_field_name().map(str::to_string)
        });
        let Some(column) = column else {
            return Err(StrategyError::WrongColumnCount { count: 0 });
        };
        (StorageMode::DirectColumn, None, vec![column])
    };

    if storage_mode == StorageMode::DirectColumn && output_columns.len() != 1 {
        return Err(StrategyError::WrongColumnCount {
            count: output_columns.len(),
        });
    }

    let raw_columns = if config.input.input_columns.is_empty() {
        vec!["raw_content".to_string()]
    } else {
        config.input.input_columns.clone()
    };
    let input_columns = raw_columns
        .iter()
        .map(|s| InputColumn::parse(s))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Strategy {
        input_table: config.table.clone().unwrap_or_else(|| default_table.to_string()),
        input_columns,
        storage_mode,
        output_table,
        output_columns,
        key_column: config.key_column.clone(),
        models,
        compiled_schema,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputSpec, ModelSelector};
    use crate::schema::{compile_schema, RawSchema};

    fn base_config(schema_yaml: &str) -> EnrichmentConfig {
        EnrichmentConfig {
            name: "sentiment".to_string(),
            description: None,
            prompt: "Classify: {raw_content}".to_string(),
            system_prompt: None,
            append_file: None,
            input: InputSpec {
                query: "SELECT * FROM documents".to_string(),
                input_columns: vec![],
            },
            schema: serde_yaml::from_str(schema_yaml).unwrap(),
            output_column: None,
            output_columns: None,
            output_table: None,
            key_column: "sha1".to_string(),
            model: ModelSelector::One("gpt-4o-mini".to_string()),
            table: None,
            truncate: None,
        }
    }

    fn compiled(raw: &RawSchema) -> CompiledSchema {
        compile_schema(raw).unwrap()
    }

    #[test]
    fn input_column_parses_plain_name() {
        let col = InputColumn::parse("raw_content").unwrap();
        assert_eq!(col.column, "raw_content");
        assert_eq!(col.char_limit, None);
        assert_eq!(col.table, None);
    }

    #[test]
    fn input_column_parses_char_limit() {
        let col = InputColumn::parse("raw_content:500").unwrap();
        assert_eq!(col.char_limit, Some(500));
    }

    #[test]
    fn input_column_parses_table_qualifier() {
        let col = InputColumn::parse("metadata.title:100").unwrap();
        assert_eq!(col.table, Some("metadata".to_string()));
        assert_eq!(col.column, "title");
        assert_eq!(col.char_limit, Some(100));
    }

    #[test]
    fn input_column_rejects_zero_limit() {
        assert!(InputColumn::parse("col:0").is_err());
    }

    #[test]
    fn single_field_schema_infers_direct_column() {
        let config = base_config("sentiment:\n  enum: [positive, negative, neutral]");
        let schema = compiled(&config.schema);
        let strategy = resolve(&config, "documents", schema).unwrap();
        assert_eq!(strategy.storage_mode, StorageMode::DirectColumn);
        assert_eq!(strategy.output_columns, vec!["sentiment"]);
        assert_eq!(strategy.input_columns[0].column, "raw_content");
    }

    #[test]
    fn complex_schema_without_output_table_fails() {
        let config = base_config("a:\n  type: string\nb:\n  type: integer");
        let schema = compiled(&config.schema);
        let err = resolve(&config, "documents", schema).unwrap_err();
        assert!(matches!(err, StrategyError::ComplexSchemaNeedsTable { .. }));
    }

    #[test]
    fn complex_schema_with_output_table_succeeds() {
        let mut config = base_config("a:\n  type: string\nb:\n  type: integer");
        config.output_table = Some("analysis".to_string());
        let schema = compiled(&config.schema);
        let strategy = resolve(&config, "documents", schema).unwrap();
        assert_eq!(strategy.storage_mode, StorageMode::SeparateTable);
        assert_eq!(strategy.output_columns, vec!["a", "b"]);
    }

    #[test]
    fn multi_model_without_output_table_fails() {
        let mut config = base_config("sentiment:\n  enum: [positive, negative]");
        config.model = ModelSelector::Many(vec!["gpt-4o-mini".to_string(), "gemini-2.0-flash".to_string()]);
        let schema = compiled(&config.schema);
        let err = resolve(&config, "documents", schema).unwrap_err();
        assert!(matches!(err, StrategyError::MultiModelNeedsTable { .. }));
    }

    #[test]
    fn missing_input_columns_defaults_to_raw_content() {
        let config = base_config("sentiment:\n  enum: [positive, negative]");
        let schema = compiled(&config.schema);
        let strategy = resolve(&config, "documents", schema).unwrap();
        assert_eq!(strategy.input_columns.len(), 1);
        assert_eq!(strategy.input_columns[0].column, "raw_content");
    }
}

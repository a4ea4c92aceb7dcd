//! Cost Estimator: a pre-flight projection of what a run will cost
//! before any provider call is made, gating large runs behind an
//! interactive confirmation.

use crate::error::ProviderError;
use crate::provider::{ModelInfo, count_tokens, model_info};
use crate::schema::{CompiledField, CompiledSchema, FieldType};

/// Flat per-call overhead tokens added to the input side for system
/// instructions and message framing the raw template text doesn't capture.
const SYSTEM_OVERHEAD_TOKENS: u32 = 200;

/// Flat per-call overhead tokens added to the output side for JSON object
/// framing (braces, field names, quoting) around the schema's values.
const JSON_FRAMING_TOKENS: u32 = 50;

/// Tokens budgeted for a scalar field's value.
const SCALAR_FIELD_TOKENS: u32 = 5;

/// Divisor used to approximate a string field's worst-case token count from
/// its `max_length` character bound.
const STRING_TOKENS_PER_CHAR_DIVISOR: u32 = 8;

/// Tokens budgeted per array/enum_list element.
const ARRAY_ITEM_TOKENS: u32 = 10;

/// Fallback `max_length`/`max_items` used when a field carries no explicit
/// bound, so the estimate stays finite rather than unbounded.
const DEFAULT_STRING_MAX_LENGTH: usize = 200;

/// Default confirmation gate in USD.
pub const DEFAULT_COST_THRESHOLD: f64 = 5.0;

/// Per-row and total cost projection for one enrichment pass over one model.
#[derive(Debug, Clone)]
pub struct CostEstimate {
    /// Model the estimate was computed for.
    pub model: String,
    /// Estimated input tokens for a single row's prompt.
    pub input_tokens_per_row: u32,
    /// Estimated output tokens for a single row's response.
    pub output_tokens_per_row: u32,
    /// Number of rows the plan will process.
    pub row_count: u64,
    /// Total estimated cost across all rows, in USD.
    pub total_cost: f64,
}

impl CostEstimate {
    /// Whether this estimate exceeds `threshold` and should be confirmed
    /// before the run proceeds.
    #[must_use]
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.total_cost > threshold
    }
}

/// Estimates the cost of running `schema` against `rendered_prompt` (the
/// template after row substitution, using a representative sample row) for
/// `row_count` rows on `model`.
///
/// # Errors
///
/// Returns [`ProviderError::UnknownModel`] if `model` has no pricing entry.
pub fn estimate(model: &str, rendered_prompt: &str, schema: &CompiledSchema, row_count: u64) -> Result<CostEstimate, ProviderError> {
    let pricing = model_info(model).ok_or_else(|| ProviderError::UnknownModel(model.to_string()))?;

    let input_tokens_per_row = count_tokens(rendered_prompt) + SYSTEM_OVERHEAD_TOKENS;
    let output_tokens_per_row = estimate_output_tokens(schema);
    let total_cost = row_total_cost(input_tokens_per_row, output_tokens_per_row, row_count, &pricing);

    Ok(CostEstimate {
        model: model.to_string(),
        input_tokens_per_row,
        output_tokens_per_row,
        row_count,
        total_cost,
    })
}

fn row_total_cost(input_tokens_per_row: u32, output_tokens_per_row: u32, row_count: u64, pricing: &ModelInfo) -> f64 {
    let total_input = f64::from(input_tokens_per_row) * row_count as f64;
    let total_output = f64::from(output_tokens_per_row) * row_count as f64;
    (total_input / 1_000_000.0) * pricing.input_price_per_million + (total_output / 1_000_000.0) * pricing.output_price_per_million
}

/// Sums per-field output token estimates plus JSON framing overhead.
#[must_use]
pub fn estimate_output_tokens(schema: &CompiledSchema) -> u32 {
    let fields_total: u32 = schema.fields.iter().map(estimate_field_tokens).sum();
    fields_total + JSON_FRAMING_TOKENS
}

fn estimate_field_tokens(field: &CompiledField) -> u32 {
    match &field.ty {
        FieldType::Scalar(crate::schema::ScalarKind::String) => {
            let max_length = field.max_length.unwrap_or(DEFAULT_STRING_MAX_LENGTH) as u32;
            (max_length / STRING_TOKENS_PER_CHAR_DIVISOR).max(1)
        }
        FieldType::Scalar(_) | FieldType::Enum { .. } => SCALAR_FIELD_TOKENS,
        FieldType::EnumList { max_items, .. } | FieldType::Array { max_items, .. } => {
            let bounded_items = (*max_items).min(64) as u32;
            bounded_items * ARRAY_ITEM_TOKENS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{compile_schema, RawSchema};

    fn schema_from_yaml(yaml: &str) -> CompiledSchema {
        let raw: RawSchema = serde_yaml::from_str(yaml).unwrap();
        compile_schema(&raw).unwrap()
    }

    #[test]
    fn estimate_scales_with_row_count() {
        let schema = schema_from_yaml("sentiment:\n  enum: [positive, negative]");
        let one_row = estimate("gpt-4o-mini", "classify: {text}", &schema, 1).unwrap();
        let thousand_rows = estimate("gpt-4o-mini", "classify: {text}", &schema, 1000).unwrap();
        assert!((thousand_rows.total_cost - one_row.total_cost * 1000.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_is_an_error() {
        let schema = schema_from_yaml("sentiment:\n  enum: [positive, negative]");
        assert!(estimate("local/llama-3", "prompt", &schema, 1).is_err());
    }

    #[test]
    fn array_fields_cost_more_than_scalars() {
        let scalar_schema = schema_from_yaml("sentiment:\n  enum: [positive, negative]");
        let array_schema = schema_from_yaml("tags:\n  type: array\n  items: string\n  max_items: 20");
        assert!(estimate_output_tokens(&array_schema) > estimate_output_tokens(&scalar_schema));
    }

    #[test]
    fn exceeds_respects_threshold() {
        let schema = schema_from_yaml("summary:\n  type: string\n  max_length: 500");
        let estimate = estimate("gpt-4o", "a very long rendered prompt template", &schema, 1_000_000).unwrap();
        assert!(estimate.exceeds(DEFAULT_COST_THRESHOLD));
        assert!(!estimate.exceeds(f64::MAX));
    }
}

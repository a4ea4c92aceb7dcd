//! `WireSchema`: the provider-neutral structured-output contract compiled
//! from a [`CompiledSchema`].
//!
//! Carries only the tag set from [`FieldType`] — no Rust-specific types —
//! so each provider adapter can translate it into its own structured-output
//! request shape (OpenAI `json_schema`, Gemini `responseSchema`).

use super::types::{CompiledSchema, FieldType, ScalarKind};
use serde::Serialize;
use serde_json::{Map, Value, json};

/// A provider-neutral JSON-schema-shaped description of one enrichment's
/// expected structured output.
#[derive(Debug, Clone, Serialize)]
pub struct WireSchema {
    /// Field descriptions, in declaration order.
    fields: Vec<WireField>,
}

#[derive(Debug, Clone, Serialize)]
struct WireField {
    name: String,
    #[serde(flatten)]
    json_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl WireSchema {
    /// Compiles a `WireSchema` from a fully compiled schema.
    #[must_use]
    pub fn from_compiled(schema: &CompiledSchema) -> Self {
        let fields = schema
            .fields
            .iter()
            .map(|f| WireField {
                name: f.name.clone(),
                json_schema: field_type_to_json_schema(&f.ty, f.max_length, f.minimum, f.maximum),
                description: f.description.clone(),
            })
            .collect();
        Self { fields }
    }

    /// Renders the schema as a single JSON Schema `object` type with all
    /// fields required — the shape both OpenAI's `json_schema` response
    /// format and a manual JSON-parse-then-validate fallback expect.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            let mut prop = field.json_schema.clone();
            if let (Some(obj), Some(desc)) = (prop.as_object_mut(), &field.description) {
                obj.insert("description".to_string(), json!(desc));
            }
            properties.insert(field.name.clone(), prop);
            required.push(field.name.clone());
        }
        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Field names in declaration order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

fn field_type_to_json_schema(
    ty: &FieldType,
    max_length: Option<usize>,
    minimum: Option<f64>,
    maximum: Option<f64>,
) -> Value {
    match ty {
        FieldType::Scalar(ScalarKind::String) => {
            let mut obj = json!({"type": "string"});
            if let Some(max_length) = max_length {
                obj["maxLength"] = json!(max_length);
            }
            obj
        }
        FieldType::Scalar(ScalarKind::Integer) => {
            numeric_schema("integer", minimum, maximum)
        }
        FieldType::Scalar(ScalarKind::Float) => numeric_schema("number", minimum, maximum),
        FieldType::Scalar(ScalarKind::Boolean) => json!({"type": "boolean"}),
        FieldType::Enum { choices, .. } => json!({"type": "string", "enum": choices}),
        FieldType::EnumList {
            choices,
            min_items,
            max_items,
            ..
        } => json!({
            "type": "array",
            "items": {"type": "string", "enum": choices},
            "minItems": min_items,
            "maxItems": if *max_items == usize::MAX { Value::Null } else { json!(max_items) },
        }),
        FieldType::Array {
            items,
            min_items,
            max_items,
        } => json!({
            "type": "array",
            "items": field_type_to_json_schema(items, None, None, None),
            "minItems": min_items,
            "maxItems": if *max_items == usize::MAX { Value::Null } else { json!(max_items) },
        }),
    }
}

fn numeric_schema(json_type: &str, minimum: Option<f64>, maximum: Option<f64>) -> Value {
    let mut obj = json!({"type": json_type});
    if let Some(min) = minimum {
        obj["minimum"] = json!(min);
    }
    if let Some(max) = maximum {
        obj["maximum"] = json!(max);
    }
    obj
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::compiler::compile_schema;
    use crate::schema::spec::RawSchema;

    #[test]
    fn renders_enum_choices_into_json_schema() {
        let raw: RawSchema = serde_yaml::from_str("sentiment:\n  enum: [positive, negative]").unwrap();
        let schema = compile_schema(&raw).unwrap();
        let wire = WireSchema::from_compiled(&schema);
        let json_schema = wire.to_json_schema();
        assert_eq!(
            json_schema["properties"]["sentiment"]["enum"],
            json!(["positive", "negative"])
        );
        assert_eq!(json_schema["required"], json!(["sentiment"]));
    }

    #[test]
    fn renders_string_max_length() {
        let raw: RawSchema = serde_yaml::from_str("summary:\n  type: string\n  max_length: 200").unwrap();
        let schema = compile_schema(&raw).unwrap();
        let wire = WireSchema::from_compiled(&schema);
        assert_eq!(wire.to_json_schema()["properties"]["summary"]["maxLength"], json!(200));
    }

    #[test]
    fn field_names_preserve_order() {
        let raw: RawSchema = serde_yaml::from_str("a:\n  type: string\nb:\n  type: integer").unwrap();
        let schema = compile_schema(&raw).unwrap();
        let wire = WireSchema::from_compiled(&schema);
        assert_eq!(wire.field_names(), vec!["a", "b"]);
    }
}

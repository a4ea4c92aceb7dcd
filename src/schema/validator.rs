//! Parses a provider's JSON response into [`DynValue`]s per the compiled
//! schema, applying `convert` before `lang` validation and the
//! `enum_list` dedupe law.

use super::types::{CompiledField, CompiledSchema, Convert, DynValue, FieldType, Lang, ScalarKind};
use crate::error::SchemaError;
use serde_json::Value;

/// A compiled schema paired with the parsing logic needed to turn a raw
/// JSON object into a map of [`DynValue`]s.
#[derive(Debug, Clone)]
pub struct Validator {
    schema: CompiledSchema,
}

impl Validator {
    /// Wraps a compiled schema for validation.
    #[must_use]
    pub const fn new(schema: CompiledSchema) -> Self {
        Self { schema }
    }

    /// The schema this validator checks against.
    #[must_use]
    pub const fn schema(&self) -> &CompiledSchema {
        &self.schema
    }

    /// Validates and coerces a JSON object, one key per schema field.
    ///
    /// Returns every field's value in schema declaration order. A field
    /// absent from `value` is treated as [`DynValue::Null`] before being
    /// passed through `convert`/`lang` (so a convert step may still run,
    /// though most convert functions are no-ops on null input).
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] encountered. Callers decide
    /// recoverability via [`SchemaError::is_recoverable`].
    pub fn validate(&self, value: &Value) -> Result<Vec<(String, DynValue)>, SchemaError> {
        let obj = value.as_object();
        self.schema
            .fields
            .iter()
            .map(|field| {
                let raw = obj.and_then(|o| o.get(&field.name)).unwrap_or(&Value::Null);
                let parsed = parse_field(field, raw)?;
                let converted = apply_convert(field, parsed)?;
                check_lang(field, &converted)?;
                Ok((field.name.clone(), converted))
            })
            .collect()
    }
}

fn parse_field(field: &CompiledField, raw: &Value) -> Result<DynValue, SchemaError> {
    match &field.ty {
        FieldType::Scalar(kind) => parse_scalar(field, *kind, raw),
        FieldType::Enum {
            choices,
            case_sensitive,
        } => parse_enum(field, choices, *case_sensitive, raw),
        FieldType::EnumList {
            choices,
            case_sensitive,
            min_items,
            max_items,
            unique_items,
        } => parse_enum_list(
            field,
            choices,
            *case_sensitive,
            *min_items,
            *max_items,
            *unique_items,
            raw,
        ),
        FieldType::Array {
            items,
            min_items,
            max_items,
        } => parse_array(field, items, *min_items, *max_items, raw),
    }
}

fn parse_scalar(field: &CompiledField, kind: ScalarKind, raw: &Value) -> Result<DynValue, SchemaError> {
    if raw.is_null() {
        return Ok(DynValue::Null);
    }
    let value = match kind {
        ScalarKind::String => {
            let s = raw
                .as_str()
                .ok_or_else(|| type_mismatch(field, "string", raw))?
                .to_string();
            if let Some(max_length) = field.max_length
                && s.chars().count() > max_length
            {
                return Err(SchemaError::TooLong {
                    field: field.name.clone(),
                    max_length,
                });
            }
            DynValue::Str(s)
        }
        ScalarKind::Integer => {
            let i = raw.as_i64().ok_or_else(|| type_mismatch(field, "integer", raw))?;
            check_numeric_bounds(field, i as f64)?;
            DynValue::Int(i)
        }
        ScalarKind::Float => {
            let f = raw.as_f64().ok_or_else(|| type_mismatch(field, "float", raw))?;
            check_numeric_bounds(field, f)?;
            DynValue::Float(f)
        }
        ScalarKind::Boolean => {
            DynValue::Bool(raw.as_bool().ok_or_else(|| type_mismatch(field, "boolean", raw))?)
        }
    };
    Ok(value)
}

fn check_numeric_bounds(field: &CompiledField, value: f64) -> Result<(), SchemaError> {
    let min = field.minimum.unwrap_or(f64::NEG_INFINITY);
    let max = field.maximum.unwrap_or(f64::INFINITY);
    if value < min || value > max {
        return Err(SchemaError::NumberOutOfBounds {
            field: field.name.clone(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn parse_enum(
    field: &CompiledField,
    choices: &[String],
    case_sensitive: bool,
    raw: &Value,
) -> Result<DynValue, SchemaError> {
    if raw.is_null() {
        return Ok(DynValue::Null);
    }
    let s = raw
        .as_str()
        .ok_or_else(|| type_mismatch(field, "enum string", raw))?;
    match_choice(choices, case_sensitive, s)
        .map(DynValue::Str)
        .ok_or_else(|| SchemaError::NotInEnum {
            field: field.name.clone(),
            value: s.to_string(),
        })
}

#[allow(clippy::too_many_arguments)]
fn parse_enum_list(
    field: &CompiledField,
    choices: &[String],
    case_sensitive: bool,
    min_items: usize,
    max_items: usize,
    unique_items: bool,
    raw: &Value,
) -> Result<DynValue, SchemaError> {
    let items = raw
        .as_array()
        .ok_or_else(|| type_mismatch(field, "array", raw))?;

    let mut canonical = Vec::with_capacity(items.len());
    for item in items {
        let s = item
            .as_str()
            .ok_or_else(|| type_mismatch(field, "enum string", item))?;
        if let Some(matched) = match_choice(choices, case_sensitive, s) {
            canonical.push(matched);
        }
        // Values outside the allowed set are silently dropped, matching the
        // original's "intersect with allowed_set" dedupe law.
    }

    let deduped = if unique_items {
        dedupe_preserving_order(canonical)
    } else {
        canonical
    };

    if deduped.len() < min_items || deduped.len() > max_items {
        return Err(SchemaError::ItemCountOutOfBounds {
            field: field.name.clone(),
            actual: deduped.len(),
            min: min_items,
            max: max_items,
        });
    }

    Ok(DynValue::List(deduped.into_iter().map(DynValue::Str).collect()))
}

fn parse_array(
    field: &CompiledField,
    element_ty: &FieldType,
    min_items: usize,
    max_items: usize,
    raw: &Value,
) -> Result<DynValue, SchemaError> {
    let items = raw
        .as_array()
        .ok_or_else(|| type_mismatch(field, "array", raw))?;

    if items.len() < min_items || items.len() > max_items {
        return Err(SchemaError::ItemCountOutOfBounds {
            field: field.name.clone(),
            actual: items.len(),
            min: min_items,
            max: max_items,
        });
    }

    let element_field = CompiledField {
        name: field.name.clone(),
        ty: element_ty.clone(),
        lang: None,
        convert: None,
        description: None,
        max_length: None,
        minimum: None,
        maximum: None,
    };
    let values = items
        .iter()
        .map(|item| parse_field(&element_field, item))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DynValue::List(values))
}

fn match_choice(choices: &[String], case_sensitive: bool, candidate: &str) -> Option<String> {
    if case_sensitive {
        choices.iter().find(|c| c.as_str() == candidate).cloned()
    } else {
        choices
            .iter()
            .find(|c| c.to_lowercase() == candidate.to_lowercase())
            .cloned()
    }
}

/// `dedupe_preserving_order` law: stable-dedupe keeping first occurrence.
fn dedupe_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

fn type_mismatch(field: &CompiledField, expected: &str, raw: &Value) -> SchemaError {
    SchemaError::TypeMismatch {
        field: field.name.clone(),
        expected: expected.to_string(),
        actual: describe_json(raw),
    }
}

fn describe_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

fn apply_convert(field: &CompiledField, value: DynValue) -> Result<DynValue, SchemaError> {
    let Some(convert) = field.convert else {
        return Ok(value);
    };
    match convert {
        Convert::ChineseToPinyin => {
            let DynValue::Str(s) = &value else {
                return Ok(value);
            };
            Ok(DynValue::Str(chinese_to_pinyin(s)))
        }
    }
}

/// Romanizes Chinese text to space-separated pinyin syllables, passing
/// through any non-Han characters unchanged.
fn chinese_to_pinyin(s: &str) -> String {
    use pinyin::ToPinyin;
    s.chars()
        .map(|c| {
            c.to_pinyin()
                .map_or_else(|| c.to_string(), |p| p.plain().to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn check_lang(field: &CompiledField, value: &DynValue) -> Result<(), SchemaError> {
    let Some(lang) = field.lang else {
        return Ok(());
    };
    let DynValue::Str(s) = value else {
        return Ok(());
    };

    let has_cjk = contains_cjk(s);
    let ok = match lang {
        Lang::Zh => has_cjk,
        Lang::En => !has_cjk,
    };
    if ok {
        return Ok(());
    }

    let (lang_tag, reason) = match lang {
        Lang::Zh => ("zh", "no CJK ideographs found"),
        Lang::En => ("en", "CJK ideographs present"),
    };
    Err(SchemaError::LanguageValidation {
        field: field.name.clone(),
        lang: lang_tag.to_string(),
        reason: reason.to_string(),
    })
}

/// Checks for CJK ideographs across the unified blocks plus extensions A-F
/// and the compatibility ideographs block.
#[must_use]
pub fn contains_cjk(s: &str) -> bool {
    s.chars().any(is_cjk_char)
}

const fn is_cjk_char(c: char) -> bool {
    matches!(c as u32,
        0x3400..=0x4DBF    // CJK Unified Ideographs Extension A
        | 0x4E00..=0x9FFF  // CJK Unified Ideographs
        | 0xF900..=0xFAFF  // CJK Compatibility Ideographs
        | 0x20000..=0x2A6DF // Extension B
        | 0x2A700..=0x2B73F // Extension C
        | 0x2B740..=0x2B81F // Extension D
        | 0x2B820..=0x2CEAF // Extension E
        | 0x2CEB0..=0x2EBEF // Extension F
        | 0x2F800..=0x2FA1F // Compatibility Supplement
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::compiler::compile_schema;
    use crate::schema::spec::RawSchema;
    use serde_json::json;

    fn schema_from_yaml(yaml: &str) -> CompiledSchema {
        let raw: RawSchema = serde_yaml::from_str(yaml).unwrap();
        compile_schema(&raw).unwrap()
    }

    #[test]
    fn validates_simple_enum() {
        let schema = schema_from_yaml("sentiment:\n  enum: [positive, negative, neutral]");
        let validator = Validator::new(schema);
        let result = validator.validate(&json!({"sentiment": "positive"})).unwrap();
        assert_eq!(result[0].1, DynValue::Str("positive".to_string()));
    }

    #[test]
    fn rejects_value_outside_enum() {
        let schema = schema_from_yaml("sentiment:\n  enum: [positive, negative]");
        let validator = Validator::new(schema);
        let err = validator.validate(&json!({"sentiment": "mixed"})).unwrap_err();
        assert!(matches!(err, SchemaError::NotInEnum { .. }));
    }

    #[test]
    fn dedupes_enum_list_preserving_order() {
        let schema = schema_from_yaml("topics:\n  enum_list: [a, b, c, d]\n  min_items: 1\n  max_items: 3");
        let validator = Validator::new(schema);
        let result = validator
            .validate(&json!({"topics": ["a", "b", "a", "b"]}))
            .unwrap();
        assert_eq!(
            result[0].1,
            DynValue::List(vec![DynValue::Str("a".into()), DynValue::Str("b".into())])
        );
    }

    #[test]
    fn empty_enum_list_fails_min_items() {
        let schema = schema_from_yaml("topics:\n  enum_list: [a, b]\n  min_items: 1\n  max_items: 3");
        let validator = Validator::new(schema);
        let err = validator.validate(&json!({"topics": []})).unwrap_err();
        assert!(matches!(err, SchemaError::ItemCountOutOfBounds { .. }));
    }

    #[test]
    fn lang_zh_requires_cjk() {
        let schema = schema_from_yaml("summary_zh:\n  type: string\n  lang: zh");
        let validator = Validator::new(schema);
        assert!(validator.validate(&json!({"summary_zh": "Hello world"})).is_err());
        assert!(validator.validate(&json!({"summary_zh": "你好世界"})).is_ok());
    }

    #[test]
    fn lang_en_forbids_cjk() {
        let schema = schema_from_yaml("summary_en:\n  type: string\n  lang: en");
        let validator = Validator::new(schema);
        assert!(validator.validate(&json!({"summary_en": "你好"})).is_err());
        assert!(validator.validate(&json!({"summary_en": "hello"})).is_ok());
    }

    #[test]
    fn convert_runs_before_lang_check() {
        let schema = schema_from_yaml(
            "summary_zh:\n  type: string\n  lang: en\n  convert: chinese_to_pinyin",
        );
        let validator = Validator::new(schema);
        // Converting Chinese to pinyin strips CJK, so the `lang: en` check
        // (which runs after convert) should pass.
        let result = validator.validate(&json!({"summary_zh": "你好"})).unwrap();
        let DynValue::Str(s) = &result[0].1 else {
            panic!("expected string");
        };
        assert!(!contains_cjk(s));
    }

    #[test]
    fn numeric_bounds_enforced() {
        let schema = schema_from_yaml("score:\n  type: float\n  minimum: 0\n  maximum: 1");
        let validator = Validator::new(schema);
        assert!(validator.validate(&json!({"score": 0.5})).is_ok());
        assert!(validator.validate(&json!({"score": 1.5})).is_err());
    }

    #[test]
    fn is_empty_result_recognizes_null_string() {
        assert!(DynValue::Str("null".to_string()).is_empty_result());
        assert!(DynValue::Str(String::new()).is_empty_result());
        assert!(DynValue::List(vec![]).is_empty_result());
        assert!(!DynValue::Str("ok".to_string()).is_empty_result());
    }

    proptest::proptest! {
        /// Dedupe never grows the list and never introduces a value absent
        /// from the input, for any sequence drawn from a small closed alphabet
        /// (the shape every real `enum_list` response takes).
        #[test]
        fn dedupe_preserving_order_is_a_subsequence_no_longer_than_input(
            items in proptest::collection::vec("[a-c]", 0..8)
        ) {
            let deduped = dedupe_preserving_order(items.clone());
            proptest::prop_assert!(deduped.len() <= items.len());
            proptest::prop_assert!(deduped.iter().all(|d| items.contains(d)));
            let mut seen = std::collections::HashSet::new();
            proptest::prop_assert!(deduped.iter().all(|d| seen.insert(d.clone())));
        }
    }
}

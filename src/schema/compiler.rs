//! Compiles a declarative [`RawSchema`] into a [`CompiledSchema`].

use super::spec::{RawField, RawSchema};
use super::types::{CompiledField, CompiledSchema, Convert, FieldType, Lang, ScalarKind};
use crate::error::SchemaError;

/// Default bounds applied when `enum_list`/`array` omit `min_items`.
const DEFAULT_MIN_ITEMS: usize = 0;
/// Default bounds applied when `enum_list`/`array` omit `max_items`.
const DEFAULT_MAX_ITEMS: usize = usize::MAX;

/// Compiles every field in `raw` into a [`CompiledSchema`].
///
/// Field order follows `raw`'s iteration order (`RawSchema` is a
/// `BTreeMap`, so order is alphabetical by field name; callers that need
/// YAML declaration order should compile from an explicit field list via
/// [`compile_fields`]).
///
/// # Errors
///
/// Returns a [`SchemaError`] for any malformed field declaration.
pub fn compile_schema(raw: &RawSchema) -> Result<CompiledSchema, SchemaError> {
    let fields = raw
        .iter()
        .map(|(name, field)| compile_field(name, field))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CompiledSchema { fields })
}

/// Compiles an explicitly ordered field list, preserving caller-supplied
/// order (used when YAML declaration order must survive into `WireSchema`).
///
/// # Errors
///
/// Returns a [`SchemaError`] for any malformed field declaration.
pub fn compile_fields(raw: &[(String, RawField)]) -> Result<CompiledSchema, SchemaError> {
    let fields = raw
        .iter()
        .map(|(name, field)| compile_field(name, field))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CompiledSchema { fields })
}

fn compile_field(name: &str, field: &RawField) -> Result<CompiledField, SchemaError> {
    let ty = compile_field_type(name, field)?;
    let lang = field
        .lang
        .as_deref()
        .map(|l| compile_lang(name, l))
        .transpose()?;
    let convert = field
        .convert
        .as_deref()
        .map(|c| compile_convert(name, c))
        .transpose()?;

    Ok(CompiledField {
        name: name.to_string(),
        ty,
        lang,
        convert,
        description: field.description.clone(),
        max_length: field.resolved_max_length(),
        minimum: field.minimum,
        maximum: field.maximum,
    })
}

fn compile_field_type(name: &str, field: &RawField) -> Result<FieldType, SchemaError> {
    if let Some(choices) = &field.enum_list {
        if choices.is_empty() {
            return Err(SchemaError::EmptyEnum {
                field: name.to_string(),
            });
        }
        return Ok(FieldType::EnumList {
            choices: choices.clone(),
            case_sensitive: field.case_sensitive.unwrap_or(true),
            min_items: field.min_items.unwrap_or(DEFAULT_MIN_ITEMS),
            max_items: field.max_items.unwrap_or(DEFAULT_MAX_ITEMS),
            unique_items: field.unique_items.unwrap_or(true),
        });
    }

    if let Some(choices) = &field.enum_choices {
        if choices.is_empty() {
            return Err(SchemaError::EmptyEnum {
                field: name.to_string(),
            });
        }
        return Ok(FieldType::Enum {
            choices: choices.clone(),
            case_sensitive: field.case_sensitive.unwrap_or(true),
        });
    }

    if let Some(items) = &field.items {
        let element = compile_field_type(name, items)?;
        if !matches!(element, FieldType::Scalar(_) | FieldType::Enum { .. }) {
            return Err(SchemaError::UnknownType(format!(
                "array field '{name}' must contain scalar or enum items"
            )));
        }
        return Ok(FieldType::Array {
            items: Box::new(element),
            min_items: field.min_items.unwrap_or(DEFAULT_MIN_ITEMS),
            max_items: field.max_items.unwrap_or(DEFAULT_MAX_ITEMS),
        });
    }

    let tag = field
        .type_tag
        .as_deref()
        .ok_or_else(|| SchemaError::UnknownType(format!("field '{name}' has no type tag")))?;

    let scalar = match tag {
        "string" => ScalarKind::String,
        "integer" => ScalarKind::Integer,
        // `number` is accepted for backward compatibility, normalized to float.
        "float" | "number" => ScalarKind::Float,
        "boolean" => ScalarKind::Boolean,
        other => return Err(SchemaError::UnknownType(other.to_string())),
    };
    Ok(FieldType::Scalar(scalar))
}

fn compile_lang(name: &str, lang: &str) -> Result<Lang, SchemaError> {
    match lang {
        "zh" => Ok(Lang::Zh),
        "en" => Ok(Lang::En),
        other => Err(SchemaError::UnknownType(format!(
            "field '{name}' has unknown lang tag '{other}' (expected zh|en)"
        ))),
    }
}

fn compile_convert(name: &str, convert: &str) -> Result<Convert, SchemaError> {
    match convert {
        "chinese_to_pinyin" => Ok(Convert::ChineseToPinyin),
        other => Err(SchemaError::UnknownConvert(format!("{other} (field '{name}')"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(yaml: &str) -> RawField {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test_case::test_case("string", "string"; "string tag")]
    #[test_case::test_case("integer", "integer"; "integer tag")]
    #[test_case::test_case("float", "float"; "float tag")]
    #[test_case::test_case("number", "float"; "number tag normalizes to float")]
    #[test_case::test_case("boolean", "boolean"; "boolean tag")]
    fn compiles_scalar_type_tag(tag: &str, expected_name: &str) {
        let f = compile_field("field", &field(&format!("type: {tag}"))).unwrap();
        assert_eq!(f.ty.type_name(), expected_name);
    }

    #[test]
    fn rejects_unknown_type_tag() {
        let err = compile_field("summary", &field("type: vector3")).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownType(_)));
    }

    #[test]
    fn rejects_empty_enum() {
        let err = compile_field("sentiment", &field("enum: []")).unwrap_err();
        assert!(matches!(err, SchemaError::EmptyEnum { .. }));
    }

    #[test]
    fn compiles_enum_list_with_bounds() {
        let f = compile_field(
            "topics",
            &field("enum_list: [a, b, c]\nmin_items: 1\nmax_items: 2"),
        )
        .unwrap();
        match f.ty {
            FieldType::EnumList {
                min_items,
                max_items,
                unique_items,
                ..
            } => {
                assert_eq!(min_items, 1);
                assert_eq!(max_items, 2);
                assert!(unique_items);
            }
            other => panic!("expected EnumList, got {other:?}"),
        }
    }

    #[test]
    fn compiles_array_of_enum() {
        let f = compile_field("labels", &field("items:\n  enum: [x, y]")).unwrap();
        assert!(matches!(f.ty, FieldType::Array { .. }));
    }

    #[test]
    fn rejects_array_of_array() {
        let err = compile_field("nested", &field("items:\n  items:\n    type: string")).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownType(_)));
    }

    #[test]
    fn compiles_lang_and_convert() {
        let f = compile_field(
            "summary_zh",
            &field("type: string\nlang: zh\nconvert: chinese_to_pinyin"),
        )
        .unwrap();
        assert_eq!(f.lang, Some(Lang::Zh));
        assert_eq!(f.convert, Some(Convert::ChineseToPinyin));
    }

    #[test]
    fn rejects_unknown_convert() {
        let err = compile_field("x", &field("type: string\nconvert: reverse")).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownConvert(_)));
    }

    #[test]
    fn schema_is_complex_above_one_field() {
        let mut raw = RawSchema::new();
        raw.insert("a".to_string(), field("type: string"));
        let schema = compile_schema(&raw).unwrap();
        assert!(!schema.is_complex());

        raw.insert("b".to_string(), field("type: integer"));
        let schema = compile_schema(&raw).unwrap();
        assert!(schema.is_complex());
    }
}

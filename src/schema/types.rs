//! The tagged-variant description tree used for both the declarative YAML
//! schema and the parsed runtime value.
//!
//! Per the design notes, a dynamically-typed source schema compiles
//! into two static artifacts: a [`FieldType`] tree describing the shape and
//! a [`DynValue`] tagged union carrying any value that shape can hold.
//! Downstream writers (the Store) consume `DynValue` generically rather
//! than through per-enrichment generated structs.

use serde::{Deserialize, Serialize};

/// A scalar kind: the leaves of the description tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// UTF-8 text.
    String,
    /// Signed integer.
    Integer,
    /// Floating point number.
    Float,
    /// Boolean.
    Boolean,
}

/// CJK presence/absence assertion applied to a field's final value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    /// Value must contain at least one CJK ideograph.
    Zh,
    /// Value must contain no CJK ideographs.
    En,
}

/// A registered post-validation value transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convert {
    /// Romanizes Chinese text to pinyin.
    ChineseToPinyin,
}

/// The compiled shape of one schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// A bare scalar.
    Scalar(ScalarKind),
    /// A closed set of string choices.
    Enum {
        /// Allowed values, in declaration order (canonical spelling).
        choices: Vec<String>,
        /// Whether matching against `choices` is case-sensitive.
        case_sensitive: bool,
    },
    /// A bounded, deduplicated list drawn from a closed set.
    EnumList {
        /// Allowed values, in declaration order (canonical spelling).
        choices: Vec<String>,
        /// Whether matching against `choices` is case-sensitive.
        case_sensitive: bool,
        /// Minimum items required after dedupe.
        min_items: usize,
        /// Maximum items allowed after dedupe.
        max_items: usize,
        /// Whether duplicate values are removed (default true).
        unique_items: bool,
    },
    /// A homogeneous array of a scalar or enum element type.
    Array {
        /// Element shape. Only `Scalar` and `Enum` are valid elements.
        items: Box<FieldType>,
        /// Minimum array length.
        min_items: usize,
        /// Maximum array length.
        max_items: usize,
    },
}

impl FieldType {
    /// A short name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Scalar(ScalarKind::String) => "string",
            Self::Scalar(ScalarKind::Integer) => "integer",
            Self::Scalar(ScalarKind::Float) => "float",
            Self::Scalar(ScalarKind::Boolean) => "boolean",
            Self::Enum { .. } => "enum",
            Self::EnumList { .. } => "enum_list",
            Self::Array { .. } => "array",
        }
    }
}

/// A single compiled field: its shape plus the per-field annotations that
/// apply after structural validation.
#[derive(Debug, Clone)]
pub struct CompiledField {
    /// Field name (the JSON object key the provider must populate).
    pub name: String,
    /// Structural shape.
    pub ty: FieldType,
    /// Optional CJK presence/absence assertion, checked after `convert`.
    pub lang: Option<Lang>,
    /// Optional post-validation transform, applied before `lang`.
    pub convert: Option<Convert>,
    /// Human-readable description surfaced to providers that support it.
    pub description: Option<String>,
    /// Hard upper bound on string length (scalar `string` fields only).
    pub max_length: Option<usize>,
    /// Inclusive numeric lower bound (scalar `integer`/`float` fields only).
    pub minimum: Option<f64>,
    /// Inclusive numeric upper bound (scalar `integer`/`float` fields only).
    pub maximum: Option<f64>,
}

/// A fully compiled schema: an ordered set of fields.
///
/// Field order is preserved from the declarative source and is significant
/// for deterministic `WireSchema` generation and for complexity analysis:
/// a schema with more than one field is considered complex.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    /// Compiled fields in declaration order.
    pub fields: Vec<CompiledField>,
}

impl CompiledSchema {
    /// Whether this schema requires a derived output table.
    #[must_use]
    pub fn is_complex(&self) -> bool {
        self.fields.len() > 1
    }

    /// The schema's single field name, when it has exactly one field.
    #[must_use]
    pub fn single_field_name(&self) -> Option<&str> {
        match self.fields.as_slice() {
            [only] => Some(only.name.as_str()),
            _ => None,
        }
    }

    /// Looks up a compiled field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&CompiledField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A dynamically-typed parsed value: the runtime counterpart of
/// [`FieldType`]. The Store and Audit Log consume these generically; no
/// per-enrichment static type is generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DynValue {
    /// A UTF-8 string, or canonical enum spelling.
    Str(String),
    /// An integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A boolean.
    Bool(bool),
    /// A homogeneous list (enum_list or array result).
    List(Vec<DynValue>),
    /// Explicit absence, distinct from "field omitted".
    Null,
}

impl DynValue {
    /// Renders the value as it should be stored: scalars/enums as their
    /// natural text, lists as JSON-encoded text.
    #[must_use]
    pub fn to_storage_text(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Null => String::new(),
            Self::List(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    /// True if the call yielded no usable data: an explicit null, an empty
    /// or `"null"` string, or an empty collection.
    #[must_use]
    pub fn is_empty_result(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Str(s) => s.is_empty() || s.eq_ignore_ascii_case("null"),
            Self::List(items) => items.is_empty(),
            Self::Int(_) | Self::Float(_) | Self::Bool(_) => false,
        }
    }
}

//! The declarative schema shape as it appears in the YAML config, prior to
//! compilation.

use serde::Deserialize;
use std::collections::BTreeMap;

/// One field's declaration in a YAML `schema:` map.
///
/// Uses `#[serde(untagged)]`-free explicit fields so the same struct can
/// represent every tag; absent fields simply stay `None`. A bare scalar tag
/// is written in YAML as e.g. `summary: { type: string }`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawField {
    /// `string | integer | float | boolean | number` (legacy).
    #[serde(rename = "type")]
    pub type_tag: Option<String>,
    /// Closed set of choices for an `enum` field.
    #[serde(rename = "enum")]
    pub enum_choices: Option<Vec<String>>,
    /// Closed set of choices for an `enum_list` field.
    pub enum_list: Option<Vec<String>>,
    /// Array element descriptor for an `array` field.
    pub items: Option<Box<RawField>>,
    /// Case sensitivity for `enum`/`enum_list` matching (default true).
    pub case_sensitive: Option<bool>,
    /// Minimum item count (`enum_list`/`array`).
    pub min_items: Option<usize>,
    /// Maximum item count (`enum_list`/`array`).
    pub max_items: Option<usize>,
    /// Whether `enum_list` duplicates are removed (default true).
    pub unique_items: Option<bool>,
    /// CJK presence/absence assertion: `zh` or `en`.
    pub lang: Option<String>,
    /// Registered post-validation transform name.
    pub convert: Option<String>,
    /// Human-readable description, carried into `WireSchema`.
    pub description: Option<String>,
    /// Max string length (`string` scalar fields), also accepted as
    /// `maxLength` for JSON-schema-style authors.
    pub max_length: Option<usize>,
    #[serde(rename = "maxLength")]
    max_length_camel: Option<usize>,
    /// Inclusive numeric lower bound.
    pub minimum: Option<f64>,
    /// Inclusive numeric upper bound.
    pub maximum: Option<f64>,
}

impl RawField {
    /// Resolves `max_length`/`maxLength` aliasing.
    #[must_use]
    pub fn resolved_max_length(&self) -> Option<usize> {
        self.max_length.or(self.max_length_camel)
    }
}

/// A declarative schema: an ordered map of field name to declaration.
///
/// `BTreeMap` is used for deterministic iteration in tests; the compiler
/// preserves the YAML source's field order separately where order matters
/// (callers pass an explicit `Vec<(String, RawField)>` when order must be
/// honored exactly as written).
pub type RawSchema = BTreeMap<String, RawField>;

//! Prompt rendering: per-input-column char limits, `{col}`/
//! `{table.col}` placeholder substitution, and literal append text.

use crate::io::unicode::truncate_graphemes;
use crate::strategy::InputColumn;
use std::collections::BTreeMap;

/// Builds one row's substitution map, keyed by the placeholder name
/// (`col`, or `table.col` for a qualified reference) after any declared
/// char limit has already been applied.
#[must_use]
pub fn column_values(
    row_columns: &BTreeMap<String, String>,
    qualified: &BTreeMap<(String, String), BTreeMap<String, String>>,
    sha1: &str,
    input_columns: &[InputColumn],
) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for input_column in input_columns {
        let raw = match &input_column.table {
            Some(table) => qualified
                .get(&(table.clone(), input_column.column.clone()))
                .and_then(|by_key| by_key.get(sha1))
                .cloned()
                .unwrap_or_default(),
            None => row_columns.get(&input_column.column).cloned().unwrap_or_default(),
        };
        let limited = match input_column.char_limit {
            Some(limit) => truncate_graphemes(&raw, limit).to_string(),
            None => raw,
        };
        values.insert(placeholder_key(input_column), limited);
    }
    values
}

fn placeholder_key(column: &InputColumn) -> String {
    match &column.table {
        Some(table) => format!("{table}.{}", column.column),
        None => column.column.clone(),
    }
}

/// Substitutes every known placeholder into `template`. A placeholder with
/// no matching column is left untouched — literal braces, no error — while every replacement that does happen is logged.
#[must_use]
pub fn substitute(template: &str, values: &BTreeMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in values {
        let placeholder = format!("{{{key}}}");
        if rendered.contains(&placeholder) {
            rendered = rendered.replace(&placeholder, value);
            tracing::debug!(placeholder = %key, "substituted prompt placeholder");
        }
    }
    rendered
}

/// Appends `append_file`'s literal text after substitution.
#[must_use]
pub fn append_literal(rendered: &str, append: Option<&str>) -> String {
    match append {
        Some(text) if !text.is_empty() => format!("{rendered}\n\n{text}"),
        _ => rendered.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(table: Option<&str>, column: &str, char_limit: Option<usize>) -> InputColumn {
        InputColumn {
            table: table.map(str::to_string),
            column: column.to_string(),
            char_limit,
        }
    }

    #[test]
    fn substitute_replaces_known_placeholder_and_leaves_unknown_one() {
        let mut values = BTreeMap::new();
        values.insert("raw_content".to_string(), "hello".to_string());
        let rendered = substitute("Classify: {raw_content}. Tag: {missing}", &values);
        assert_eq!(rendered, "Classify: hello. Tag: {missing}");
    }

    #[test]
    fn column_values_applies_char_limit() {
        let mut row_columns = BTreeMap::new();
        row_columns.insert("raw_content".to_string(), "hello world".to_string());
        let columns = vec![col(None, "raw_content", Some(5))];
        let values = column_values(&row_columns, &BTreeMap::new(), "sha1abc", &columns);
        assert_eq!(values["raw_content"], "hello");
    }

    #[test]
    fn column_values_looks_up_qualified_columns_by_sha1() {
        let mut qualified = BTreeMap::new();
        let mut by_sha1 = BTreeMap::new();
        by_sha1.insert("sha1abc".to_string(), "Title Text".to_string());
        qualified.insert(("metadata".to_string(), "title".to_string()), by_sha1);
        let columns = vec![col(Some("metadata"), "title", None)];
        let values = column_values(&BTreeMap::new(), &qualified, "sha1abc", &columns);
        assert_eq!(values["metadata.title"], "Title Text");
    }

    #[test]
    fn append_literal_adds_blank_line_separator() {
        assert_eq!(append_literal("base", Some("extra")), "base\n\nextra");
        assert_eq!(append_literal("base", None), "base");
        assert_eq!(append_literal("base", Some("")), "base");
    }
}

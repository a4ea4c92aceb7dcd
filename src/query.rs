//! Query Planner.
//!
//! Rewrites a stored or raw `SELECT` into the exact query the engine runs,
//! mirroring `original_source/src/main.py`'s `_async_cli` query-assembly
//! block: inject/strip an `<output_column> IS NULL` filter depending on
//! overwrite mode, force a deterministic `ORDER BY rowid`, apply or replace
//! `LIMIT N`, and let `--rowid`/`--sha1` bypass all of the above.

use crate::error::QueryError;
use crate::strategy::InputColumn;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static ORDER_BY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\border\s+by\b").expect("valid regex"));
static LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\blimit\s+\d+").expect("valid regex"));
static LIMIT_POSITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+limit\s+\d+").expect("valid regex"));
static SELECT_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(\s*select\s+(?:distinct\s+)?)(.*?)(\s+from\s+.*)$").expect("valid regex"));
static WHERE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bwhere\b").expect("valid regex"));

/// A row-selector bypass that overrides the rewritten query entirely.
#[derive(Debug, Clone)]
pub enum RowSelector {
    /// Process only the row with this `rowid`.
    Rowid(i64),
    /// Process only the row with this content-address key.
    Sha1(String),
}

/// Inputs the planner needs to produce a final query.
#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    /// The stored/raw SQL text (already resolved from `sql_queries`).
    pub base_sql: &'a str,
    /// Source table, used only when a [`RowSelector`] bypass is active.
    pub table: &'a str,
    /// The single output column, when running in `direct_column` mode.
    /// `None` for `separate_table` mode, where no skip filter applies.
    pub output_column: Option<&'a str>,
    /// Whether to reprocess rows that already carry a value.
    pub overwrite: bool,
    /// CLI `--limit` override, replacing any `LIMIT` already in the query.
    pub limit: Option<u64>,
    /// CLI `--rowid`/`--sha1`, which bypasses filter/order/limit rewriting.
    pub row_selector: Option<RowSelector>,
}

/// The final, ready-to-execute query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    /// Rewritten SQL text.
    pub sql: String,
}

/// Produces the final query for one enrichment pass.
///
/// # Errors
///
/// Returns [`QueryError`] if `base_sql` is not recognizably a `SELECT`.
pub fn plan(request: &PlanRequest<'_>) -> Result<QueryPlan, QueryError> {
    if let Some(selector) = &request.row_selector {
        let filter = match selector {
            RowSelector::Rowid(id) => format!("rowid = {id}"),
            RowSelector::Sha1(sha1) => format!("sha1 = '{sha1}'", sha1 = sha1.replace('\'', "''")),
        };
        return Ok(QueryPlan {
            sql: format!("SELECT rowid, * FROM {} WHERE {filter}", request.table),
        });
    }

    let mut sql = request.base_sql.trim().to_string();
    sql = ensure_rowid_selected(&sql)?;

    if let Some(output_column) = request.output_column {
        sql = if request.overwrite {
            strip_null_filter(&sql, output_column)
        } else {
            add_null_filter(&sql, output_column)
        };
    }

    sql = ensure_order_by_rowid(&sql);

    if let Some(limit) = request.limit {
        sql = apply_limit(&sql, limit);
    }

    Ok(QueryPlan { sql })
}

/// Ensures the `SELECT` list includes a bare `rowid` column, since `SELECT *`
/// never surfaces a table's hidden rowid on its own.
fn ensure_rowid_selected(sql: &str) -> Result<String, QueryError> {
    let caps = SELECT_LIST_RE.captures(sql).ok_or_else(|| QueryError::MissingRelation {
        message: "query must start with SELECT ... FROM ...".to_string(),
    })?;
    let select_list = &caps[2];
    let already_present = select_list
        .split(',')
        .any(|col| col.trim().eq_ignore_ascii_case("rowid"));
    if already_present {
        Ok(sql.to_string())
    } else {
        Ok(format!("{}rowid, {}{}", &caps[1], select_list, &caps[3]))
    }
}

/// Overwrite mode: remove any existing `<col> IS NULL` filter so every row
/// is reprocessed (mirrors `main.py`'s `WHERE ... IS NULL` -> `WHERE 1=1`
/// and `AND ... IS NULL` -> removed).
fn strip_null_filter(sql: &str, output_column: &str) -> String {
    let escaped = regex::escape(output_column);
    let where_pattern = Regex::new(&format!(r"(?i)where\s+{escaped}\s+is\s+null(?=\s|$)")).expect("valid regex");
    let mut rewritten = where_pattern.replace(sql, "WHERE 1=1").into_owned();
    let and_pattern = Regex::new(&format!(r"(?i)\s*and\s+{escaped}\s+is\s+null(?=\s|$)")).expect("valid regex");
    rewritten = and_pattern.replace(&rewritten, "").into_owned();
    rewritten
}

/// Append (skip-already-enriched) mode: add an `IS NULL` filter on the
/// output column unless one is already present.
fn add_null_filter(sql: &str, output_column: &str) -> String {
    let escaped = regex::escape(output_column);
    let has_filter = Regex::new(&format!(r"(?i){escaped}\s+is\s+null"))
        .expect("valid regex")
        .is_match(sql);
    if has_filter {
        return sql.to_string();
    }

    if WHERE_RE.is_match(sql) {
        let pattern = Regex::new(r"(?i)\bwhere\b").expect("valid regex");
        let replacement = format!("WHERE {output_column} IS NULL AND");
        pattern.replacen(sql, 1, replacement.as_str()).into_owned()
    } else if let Some(m) = ORDER_BY_RE.find(sql) {
        format!("{} WHERE {output_column} IS NULL {}", &sql[..m.start()], &sql[m.start()..])
    } else if let Some(m) = LIMIT_POSITION_RE.find(sql) {
        format!("{} WHERE {output_column} IS NULL{}", &sql[..m.start()], &sql[m.start()..])
    } else {
        format!("{} WHERE {output_column} IS NULL", sql.trim_end())
    }
}

/// Forces a deterministic row order, inserting before any existing `LIMIT`.
fn ensure_order_by_rowid(sql: &str) -> String {
    if ORDER_BY_RE.is_match(sql) {
        return sql.to_string();
    }
    if let Some(m) = LIMIT_POSITION_RE.find(sql) {
        format!("{} ORDER BY rowid{}", &sql[..m.start()], &sql[m.start()..])
    } else {
        format!("{} ORDER BY rowid", sql.trim_end())
    }
}

/// Applies `limit`, replacing any existing `LIMIT N` clause.
fn apply_limit(sql: &str, limit: u64) -> String {
    if LIMIT_RE.is_match(sql) {
        let replacement = format!("LIMIT {limit}");
        LIMIT_RE.replace(sql, replacement.as_str()).into_owned()
    } else {
        format!("{} LIMIT {limit}", sql.trim_end())
    }
}

/// Groups a strategy's input columns by table for the two-phase fetch
///: columns with no table qualifier came back with the primary row
/// selection; qualified columns need one extra `fetch_qualified_columns`
/// call per distinct table.
#[must_use]
pub fn qualified_columns_by_table(columns: &[InputColumn]) -> BTreeMap<&str, Vec<&InputColumn>> {
    let mut grouped: BTreeMap<&str, Vec<&InputColumn>> = BTreeMap::new();
    for column in columns {
        if let Some(table) = column.table.as_deref() {
            grouped.entry(table).or_default().push(column);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req<'a>(base_sql: &'a str, output_column: Option<&'a str>, overwrite: bool) -> PlanRequest<'a> {
        PlanRequest {
            base_sql,
            table: "documents",
            output_column,
            overwrite,
            limit: None,
            row_selector: None,
        }
    }

    #[test]
    fn injects_rowid_when_absent() {
        let plan = plan(&req("SELECT sha1, raw_content FROM documents", None, false)).unwrap();
        assert!(plan.sql.starts_with("SELECT rowid, sha1, raw_content FROM documents"));
    }

    #[test]
    fn does_not_duplicate_existing_rowid() {
        let plan = plan(&req("SELECT rowid, sha1 FROM documents", None, false)).unwrap();
        assert_eq!(plan.sql.matches("rowid").count(), 2, "one in SELECT list, one in ORDER BY");
    }

    #[test]
    fn skip_mode_adds_null_filter_without_where() {
        let plan = plan(&req("SELECT rowid, sha1 FROM documents", Some("sentiment"), false)).unwrap();
        assert!(plan.sql.contains("WHERE sentiment IS NULL"));
    }

    #[test]
    fn skip_mode_adds_null_filter_with_existing_where() {
        let plan = plan(&req(
            "SELECT rowid, sha1 FROM documents WHERE lang = 'en'",
            Some("sentiment"),
            false,
        ))
        .unwrap();
        assert!(plan.sql.contains("sentiment IS NULL AND"));
        assert!(plan.sql.contains("lang = 'en'"));
    }

    #[test]
    fn overwrite_mode_strips_where_null_filter() {
        let plan = plan(&req(
            "SELECT rowid, sha1 FROM documents WHERE sentiment IS NULL",
            Some("sentiment"),
            true,
        ))
        .unwrap();
        assert!(!plan.sql.contains("IS NULL"));
        assert!(plan.sql.contains("WHERE 1=1"));
    }

    #[test]
    fn overwrite_mode_strips_and_null_filter() {
        let plan = plan(&req(
            "SELECT rowid, sha1 FROM documents WHERE lang = 'en' AND sentiment IS NULL",
            Some("sentiment"),
            true,
        ))
        .unwrap();
        assert!(!plan.sql.contains("IS NULL"));
        assert!(plan.sql.contains("lang = 'en'"));
    }

    #[test]
    fn appends_order_by_rowid_when_absent() {
        let plan = plan(&req("SELECT rowid, sha1 FROM documents", None, false)).unwrap();
        assert!(plan.sql.contains("ORDER BY rowid"));
    }

    #[test]
    fn does_not_duplicate_existing_order_by() {
        let plan = plan(&req("SELECT rowid, sha1 FROM documents ORDER BY created_at", None, false)).unwrap();
        assert_eq!(plan.sql.matches("ORDER BY").count(), 1);
    }

    #[test]
    fn limit_replaces_existing_limit() {
        let mut request = req("SELECT rowid, sha1 FROM documents LIMIT 10", None, false);
        request.limit = Some(5);
        let plan = plan(&request).unwrap();
        assert!(plan.sql.contains("LIMIT 5"));
        assert!(!plan.sql.contains("LIMIT 10"));
    }

    #[test]
    fn limit_appends_when_absent() {
        let mut request = req("SELECT rowid, sha1 FROM documents", None, false);
        request.limit = Some(5);
        let plan = plan(&request).unwrap();
        assert!(plan.sql.contains("LIMIT 5"));
    }

    #[test]
    fn rowid_selector_overrides_everything() {
        let mut request = req("SELECT rowid, sha1 FROM documents WHERE sentiment IS NULL", Some("sentiment"), false);
        request.row_selector = Some(RowSelector::Rowid(42));
        let plan = plan(&request).unwrap();
        assert_eq!(plan.sql, "SELECT rowid, * FROM documents WHERE rowid = 42");
    }

    #[test]
    fn sha1_selector_escapes_quotes() {
        let mut request = req("SELECT rowid, sha1 FROM documents", None, false);
        request.row_selector = Some(RowSelector::Sha1("ab'cd".to_string()));
        let plan = plan(&request).unwrap();
        assert_eq!(plan.sql, "SELECT rowid, * FROM documents WHERE sha1 = 'ab''cd'");
    }

    #[test]
    fn qualified_columns_grouped_by_table() {
        let columns = vec![
            InputColumn { table: None, column: "raw_content".to_string(), char_limit: None },
            InputColumn { table: Some("metadata".to_string()), column: "title".to_string(), char_limit: None },
            InputColumn { table: Some("metadata".to_string()), column: "author".to_string(), char_limit: None },
        ];
        let grouped = qualified_columns_by_table(&columns);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped["metadata"].len(), 2);
    }
}

//! `#name#` placeholder resolution against earlier result sets in a chain.
//!
//! A placeholder is `#`, one or more ASCII letters, digits or underscores, then `#`. Anything
//! else containing `#` is left alone. Resolution replaces each placeholder with an inline SQL
//! literal; positional `$N` markers are never touched.

use crate::models::{ResultSet, Row, SqlValue};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use thiserror::Error;
use tracing::debug;

/// A placeholder matched a column whose value could not be decoded, so there is no literal
/// to substitute.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("placeholder #{key}# refers to column {column}, whose value could not be decoded; cast it to text")]
pub struct UndecodedValue {
    pub key: String,
    pub column: String,
}

/// A piece of statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    /// Key between the `#` delimiters, exactly as written.
    Placeholder(&'a str),
}

fn is_key_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Split `text` into literal runs and placeholders, left to right without overlap.
pub fn tokenize(text: &str) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'#' {
            let key_start = i + 1;
            let mut end = key_start;
            while end < bytes.len() && is_key_byte(bytes[end]) {
                end += 1;
            }
            if end > key_start && end < bytes.len() && bytes[end] == b'#' {
                if literal_start < i {
                    segments.push(Segment::Literal(&text[literal_start..i]));
                }
                segments.push(Segment::Placeholder(&text[key_start..end]));
                i = end + 1;
                literal_start = i;
                continue;
            }
        }
        i += 1;
    }

    if literal_start < bytes.len() {
        segments.push(Segment::Literal(&text[literal_start..]));
    }
    segments
}

/// Find the value for `key` in earlier results.
///
/// Result sets are scanned newest first and rows last first; column names are compared
/// ignoring ASCII case. A column that exists with a null value is a hit.
pub fn lookup<'a>(key: &str, results: &'a [ResultSet]) -> Option<&'a JsonValue> {
    find(key, results).map(|hit| hit.value)
}

struct Hit<'a> {
    result: &'a ResultSet,
    row: usize,
    column: &'a str,
    value: &'a JsonValue,
}

fn find<'a>(key: &str, results: &'a [ResultSet]) -> Option<Hit<'a>> {
    results.iter().rev().find_map(|result| {
        result
            .rows
            .iter()
            .enumerate()
            .rev()
            .find_map(|(row, values): (usize, &'a Row)| {
                values
                    .iter()
                    .find(|(column, _)| column.eq_ignore_ascii_case(key))
                    .map(|(column, value)| Hit {
                        result,
                        row,
                        column: column.as_str(),
                        value,
                    })
            })
    })
}

/// Replace every placeholder in `text` with the SQL literal of its looked-up value.
///
/// Keys with no match resolve to `NULL`. A key that matches a cell the driver could not
/// decode is an error. Text without placeholders is returned borrowed.
pub fn resolve<'a>(text: &'a str, results: &[ResultSet]) -> Result<Cow<'a, str>, UndecodedValue> {
    let segments = tokenize(text);
    if !segments
        .iter()
        .any(|segment| matches!(segment, Segment::Placeholder(_)))
    {
        return Ok(Cow::Borrowed(text));
    }

    let mut resolved = String::with_capacity(text.len());
    for segment in segments {
        match segment {
            Segment::Literal(literal) => resolved.push_str(literal),
            Segment::Placeholder(key) => {
                let literal = match find(key, results) {
                    Some(hit) if hit.result.is_undecoded(hit.row, hit.column) => {
                        return Err(UndecodedValue {
                            key: key.to_string(),
                            column: hit.column.to_string(),
                        });
                    }
                    Some(hit) => SqlValue::from_json(hit.value).to_sql_literal(),
                    None => {
                        debug!(key = %key, "Placeholder has no prior value, substituting NULL");
                        SqlValue::Null.to_sql_literal()
                    }
                };
                resolved.push_str(&literal);
            }
        }
    }
    Ok(Cow::Owned(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(rows: Vec<JsonValue>) -> ResultSet {
        let rows = rows
            .into_iter()
            .map(|v| match v {
                JsonValue::Object(map) => map,
                _ => Row::new(),
            })
            .collect::<Vec<_>>();
        ResultSet {
            rows_affected: rows.len() as u64,
            rows,
            ..Default::default()
        }
    }

    #[test]
    fn test_tokenize_mixed() {
        let segments = tokenize("UPDATE t SET x = #a# WHERE y = #b_2#;");
        assert_eq!(
            segments,
            vec![
                Segment::Literal("UPDATE t SET x = "),
                Segment::Placeholder("a"),
                Segment::Literal(" WHERE y = "),
                Segment::Placeholder("b_2"),
                Segment::Literal(";"),
            ]
        );
    }

    #[test]
    fn test_tokenize_leaves_non_placeholders() {
        assert_eq!(tokenize("a ## b"), vec![Segment::Literal("a ## b")]);
        assert_eq!(tokenize("#not closed"), vec![Segment::Literal("#not closed")]);
        assert_eq!(tokenize("#has space#"), vec![Segment::Literal("#has space#")]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_tokenize_no_overlap() {
        assert_eq!(
            tokenize("#a#b#"),
            vec![Segment::Placeholder("a"), Segment::Literal("b#")]
        );
        assert_eq!(
            tokenize("##a#"),
            vec![Segment::Literal("#"), Segment::Placeholder("a")]
        );
    }

    #[test]
    fn test_tokenize_non_ascii_literal() {
        assert_eq!(
            tokenize("SELECT 'é' || #k#"),
            vec![Segment::Literal("SELECT 'é' || "), Segment::Placeholder("k")]
        );
    }

    #[test]
    fn test_lookup_prefers_newest_result_and_last_row() {
        let results = vec![
            result(vec![json!({"id": 1})]),
            result(vec![json!({"id": 2}), json!({"id": 3})]),
        ];
        assert_eq!(lookup("id", &results), Some(&json!(3)));
    }

    #[test]
    fn test_lookup_falls_back_to_older_results() {
        let results = vec![
            result(vec![json!({"author_id": 7})]),
            result(vec![json!({"id": 9})]),
            result(vec![]),
        ];
        assert_eq!(lookup("author_id", &results), Some(&json!(7)));
        assert_eq!(lookup("missing", &results), None);
    }

    #[test]
    fn test_lookup_ignores_case() {
        let results = vec![result(vec![json!({"AuthorId": 11})])];
        assert_eq!(lookup("authorid", &results), Some(&json!(11)));
        assert_eq!(lookup("AUTHORID", &results), Some(&json!(11)));
    }

    #[test]
    fn test_resolve_substitutes_literals() {
        let results = vec![result(vec![json!({"id": 5, "name": "O'Hara", "ok": true})])];
        let resolved = resolve(
            "INSERT INTO t VALUES (#id#, #name#, #ok#, $1)",
            &results,
        )
        .unwrap();
        assert_eq!(resolved, "INSERT INTO t VALUES (5, 'O''Hara', TRUE, $1)");
    }

    #[test]
    fn test_resolve_missing_and_null_become_null() {
        let results = vec![result(vec![json!({"meta": null})])];
        assert_eq!(
            resolve("SELECT #meta#, #nope#", &results).unwrap(),
            "SELECT NULL, NULL"
        );
        assert_eq!(resolve("SELECT #nope#", &[]).unwrap(), "SELECT NULL");
    }

    #[test]
    fn test_resolve_without_placeholders_borrows() {
        let text = "SELECT '#' AS hash, $1";
        assert!(matches!(resolve(text, &[]), Ok(Cow::Borrowed(_))));
    }

    #[test]
    fn test_resolve_json_value_is_quoted() {
        let results = vec![result(vec![json!({"doc": {"a": [1, 2]}})])];
        assert_eq!(
            resolve("SELECT #doc#", &results).unwrap(),
            r#"SELECT '{"a":[1,2]}'"#
        );
    }

    #[test]
    fn test_resolve_rejects_undecoded_cell() {
        let mut undecodable = ResultSet::default();
        let mut row = Row::new();
        row.insert("Span".to_string(), JsonValue::Null);
        undecodable.push_row(row, vec!["Span".to_string()]);
        let results = vec![result(vec![json!({"span": "1 day"})]), undecodable];

        let err = resolve("SELECT #span#", &results).unwrap_err();
        assert_eq!(
            err,
            UndecodedValue {
                key: "span".to_string(),
                column: "Span".to_string(),
            }
        );
        assert!(err.to_string().contains("cast it to text"));
    }

    #[test]
    fn test_resolve_skips_undecoded_cell_in_older_row() {
        let mut result = ResultSet::default();
        let mut row = Row::new();
        row.insert("v".to_string(), JsonValue::Null);
        result.push_row(row, vec!["v".to_string()]);
        let mut row = Row::new();
        row.insert("v".to_string(), json!(5));
        result.push_row(row, Vec::new());

        assert_eq!(resolve("SELECT #v#", &[result]).unwrap(), "SELECT 5");
    }
}

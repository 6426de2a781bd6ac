//! Query-related data models.
//!
//! This module defines statements, the scalar values bound to them, and the result sets
//! produced by executing them.

use crate::sql::placeholder::{self, Segment};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single result row, keyed by column name exactly as the database returned it.
pub type Row = serde_json::Map<String, JsonValue>;

/// A scalar value bound to a positional `$N` marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Text(String),
    /// JSON document (arrays and objects)
    Json(JsonValue),
}

impl SqlValue {
    /// Convert a decoded column value into a scalar.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            JsonValue::String(s) => Self::Text(s.clone()),
            other => Self::Json(other.clone()),
        }
    }

    /// Render this value as an inline SQL literal.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) if f.is_finite() => f.to_string(),
            Self::Float(f) => quote_literal(&f.to_string()),
            Self::Text(s) => quote_literal(s),
            Self::Json(v) => quote_literal(&v.to_string()),
        }
    }
}

/// Single-quote a string for SQL, doubling embedded quotes.
fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<JsonValue> for SqlValue {
    fn from(v: JsonValue) -> Self {
        Self::from_json(&v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Parameterized SQL text plus its positional values.
///
/// `$1..$n` markers in `text` line up with `values` in order. The text may also carry
/// `#name#` placeholders, which are resolved only when the statement runs inside a chained
/// transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub text: String,
    #[serde(default)]
    pub values: Vec<SqlValue>,
}

impl Statement {
    /// Create a statement from text and its positional values.
    pub fn new(text: impl Into<String>, values: Vec<SqlValue>) -> Self {
        Self {
            text: text.into(),
            values,
        }
    }

    /// Create a statement with no bound values.
    pub fn raw(text: impl Into<String>) -> Self {
        Self::new(text, Vec::new())
    }

    /// Append a positional value.
    pub fn with_value(mut self, value: impl Into<SqlValue>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Named placeholder keys in this statement's text, in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        placeholder::tokenize(&self.text)
            .into_iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(key) => Some(key),
                Segment::Literal(_) => None,
            })
            .collect()
    }
}

impl From<&str> for Statement {
    fn from(text: &str) -> Self {
        Self::raw(text)
    }
}

impl From<String> for Statement {
    fn from(text: String) -> Self {
        Self::raw(text)
    }
}

/// A cell whose non-null value the driver could not convert to JSON. It reads as `null` in
/// [`ResultSet::rows`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndecodedCell {
    pub row: usize,
    pub column: String,
}

/// Rows produced by executing exactly one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub undecoded: Vec<UndecodedCell>,
}

impl ResultSet {
    /// Append a row along with the names of its columns that failed to decode.
    pub fn push_row(&mut self, row: Row, undecoded: Vec<String>) {
        let index = self.rows.len();
        self.undecoded.extend(
            undecoded
                .into_iter()
                .map(|column| UndecodedCell { row: index, column }),
        );
        self.rows.push(row);
    }

    /// Whether the value at `row`/`column` is a `null` standing in for an undecodable value.
    pub fn is_undecoded(&self, row: usize, column: &str) -> bool {
        self.undecoded
            .iter()
            .any(|cell| cell.row == row && cell.column == column)
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result returned no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row, if any.
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Value of `column` in the first row.
    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        self.first().and_then(|row| row.get(column))
    }
}

/// What to run: one statement directly, or a batch as one chained transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryInput {
    Single(Statement),
    Batch(Vec<Statement>),
}

impl From<Statement> for QueryInput {
    fn from(statement: Statement) -> Self {
        Self::Single(statement)
    }
}

impl From<&str> for QueryInput {
    fn from(text: &str) -> Self {
        Self::Single(text.into())
    }
}

impl From<String> for QueryInput {
    fn from(text: String) -> Self {
        Self::Single(text.into())
    }
}

impl From<Vec<Statement>> for QueryInput {
    fn from(statements: Vec<Statement>) -> Self {
        Self::Batch(statements)
    }
}

impl From<Vec<&str>> for QueryInput {
    fn from(texts: Vec<&str>) -> Self {
        Self::Batch(texts.into_iter().map(Statement::from).collect())
    }
}

/// Result of [`QueryInput`]: one result set, or one per batch statement in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Single(ResultSet),
    Batch(Vec<ResultSet>),
}

impl QueryOutput {
    /// The single result set, or the last result set of a batch.
    pub fn into_single(self) -> Option<ResultSet> {
        match self {
            Self::Single(result) => Some(result),
            Self::Batch(results) => results.into_iter().last(),
        }
    }

    /// All result sets; a single result becomes a one-element batch.
    pub fn into_batch(self) -> Vec<ResultSet> {
        match self {
            Self::Single(result) => vec![result],
            Self::Batch(results) => results,
        }
    }
}

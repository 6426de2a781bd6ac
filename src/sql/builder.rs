//! Parameterized INSERT and UPDATE statements built from field maps.
//!
//! Fields are `(name, Option<SqlValue>)` pairs in caller order. `None` means the field is
//! undefined and is skipped; `Some(SqlValue::Null)` is an explicit null and is bound like any
//! other value. A builder that ends up with no parameters returns `None` rather than an
//! empty or unconditional statement.

use crate::models::{SqlValue, Statement};
use crate::sql::case::camel_to_snake;

/// Ordered field map for the statement builders.
///
/// # Example
///
/// ```
/// use chainsql::sql::{Fields, build_insert};
///
/// let fields = Fields::new()
///     .field("firstName", "Ada")
///     .maybe("nickname", None::<String>);
/// let stmt = build_insert("users", fields).unwrap();
/// assert_eq!(stmt.text, "INSERT INTO users (first_name) VALUES ($1)");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, Option<SqlValue>)>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a defined field. `SqlValue::Null` counts as defined.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.0.push((name.into(), Some(value.into())));
        self
    }

    /// Add a field that is skipped when `value` is `None`.
    pub fn maybe<V: Into<SqlValue>>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        self.0.push((name.into(), value.map(Into::into)));
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Fields {
    type Item = (String, Option<SqlValue>);
    type IntoIter = std::vec::IntoIter<(String, Option<SqlValue>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Build `INSERT INTO <table> (<cols>) VALUES ($1, ...)` from the defined fields.
pub fn build_insert<I, K>(table: &str, fields: I) -> Option<Statement>
where
    I: IntoIterator<Item = (K, Option<SqlValue>)>,
    K: AsRef<str>,
{
    let mut columns = Vec::new();
    let mut markers = Vec::new();
    let mut values = Vec::new();

    for (name, value) in fields {
        let Some(value) = value else { continue };
        values.push(value);
        columns.push(camel_to_snake(name.as_ref()));
        markers.push(format!("${}", values.len()));
    }

    if values.is_empty() {
        return None;
    }

    let text = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        markers.join(", ")
    );
    Some(Statement::new(text, values))
}

/// Build `UPDATE <table> SET <col> = $1, ... [WHERE <col> = $N]` from the defined fields.
///
/// Only a single condition pair is supported; compose multi-condition updates as free-form
/// text. When no field is defined the condition is ignored and `None` is returned.
pub fn build_update<I, K>(
    table: &str,
    fields: I,
    condition: Option<(&str, SqlValue)>,
) -> Option<Statement>
where
    I: IntoIterator<Item = (K, Option<SqlValue>)>,
    K: AsRef<str>,
{
    let mut assignments = Vec::new();
    let mut values = Vec::new();

    for (name, value) in fields {
        let Some(value) = value else { continue };
        values.push(value);
        assignments.push(format!(
            "{} = ${}",
            camel_to_snake(name.as_ref()),
            values.len()
        ));
    }

    if values.is_empty() {
        return None;
    }

    let mut text = format!("UPDATE {} SET {}", table, assignments.join(", "));
    if let Some((key, value)) = condition {
        values.push(value);
        text.push_str(&format!(" WHERE {} = ${}", camel_to_snake(key), values.len()));
    }
    Some(Statement::new(text, values))
}

//! Row decoding into JSON maps.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Backend-specific decoders handle the actual value extraction
//!
//! Decoded values feed both the caller's result sets and placeholder resolution. A non-null
//! column that no decoder understands is reported in [`DecodedRow::undecoded`] next to a JSON
//! `null`, so placeholder resolution can tell it apart from a real SQL NULL.

use crate::models::{DatabaseType, Row as JsonRow};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    /// Dates, times and timestamps
    Temporal,
    Uuid,
    /// One-dimensional PostgreSQL arrays (`INT4[]`, `TEXT[]`, ...)
    Array,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Element names would otherwise match the scalar checks below
    if lower.ends_with("[]") {
        return TypeCategory::Array;
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity stores integers or reals
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("timestamp") || lower.contains("date") || lower.starts_with("time") {
        return TypeCategory::Temporal;
    }

    // INTERVAL and POINT contain "int" but are not integers
    if (lower.contains("int") && !lower.contains("interval") && !lower.contains("point"))
        || lower.contains("serial")
        || lower == "oid"
    {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    // UUID (PostgreSQL)
    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower == "text" || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// Binary column data as base64 text.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// A row decoded to JSON, plus the names of the columns whose values could not be decoded.
#[derive(Debug, Default)]
pub struct DecodedRow {
    pub values: JsonRow,
    pub undecoded: Vec<String>,
}

impl DecodedRow {
    fn push(&mut self, column: &str, value: Option<JsonValue>) {
        let value = value.unwrap_or_else(|| {
            self.undecoded.push(column.to_string());
            JsonValue::Null
        });
        self.values.insert(column.to_string(), value);
    }
}

/// Trait for converting database rows to JSON maps keyed by column name.
pub trait RowToJson {
    fn decode_row(&self) -> DecodedRow;
}

impl RowToJson for PgRow {
    fn decode_row(&self) -> DecodedRow {
        let mut decoded = DecodedRow::default();
        for (idx, col) in self.columns().iter().enumerate() {
            let category = categorize_type(col.type_info().name(), DatabaseType::PostgreSQL);
            let value = postgres::decode_column(self, idx, category);
            if value.is_none() {
                tracing::debug!(
                    column = col.name(),
                    type_name = col.type_info().name(),
                    "Column type not decodable, cast it to text"
                );
            }
            decoded.push(col.name(), value);
        }
        decoded
    }
}

impl RowToJson for SqliteRow {
    fn decode_row(&self) -> DecodedRow {
        let mut decoded = DecodedRow::default();
        for (idx, col) in self.columns().iter().enumerate() {
            let category = categorize_type(col.type_info().name(), DatabaseType::SQLite);
            decoded.push(col.name(), Some(sqlite::decode_column(self, idx, category)));
        }
        decoded
    }
}

/// Decoders return `None` when the value is non-null but no known Rust type accepts it.
mod postgres {
    use super::*;
    use sqlx::postgres::types::Oid;
    use sqlx::postgres::{PgValueFormat, Postgres};
    use sqlx::types::{BigDecimal, Uuid};
    use sqlx::{Decode, Type, ValueRef};

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> Option<JsonValue> {
        let raw = row.try_get_raw(idx).ok()?;
        if raw.is_null() {
            return Some(JsonValue::Null);
        }

        let decoded = match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Uuid => decode_uuid(row, idx),
            TypeCategory::Array => decode_array(row, idx),
            TypeCategory::Text | TypeCategory::Unknown => decode_text(row, idx),
        };

        // Simple-protocol results arrive as text, so any type still has a printable form
        decoded.or_else(|| match raw.format() {
            PgValueFormat::Text => raw.as_str().ok().map(|s| JsonValue::String(s.to_string())),
            PgValueFormat::Binary => None,
        })
    }

    /// NUMERIC keeps its exact digits as a string; JSON numbers would round it.
    fn decode_decimal(row: &PgRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<BigDecimal, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.to_string()))
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        row.try_get::<Oid, _>(idx)
            .ok()
            .map(|v| JsonValue::Number(v.0.into()))
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<bool, _>(idx).ok().map(JsonValue::Bool)
    }

    fn decode_float(row: &PgRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(float_value(v));
        }
        row.try_get::<f32, _>(idx)
            .ok()
            .map(|v| float_value(v as f64))
    }

    fn decode_binary(row: &PgRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(|v| encode_binary(&v))
    }

    fn decode_json(row: &PgRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<JsonValue, _>(idx).ok()
    }

    fn decode_uuid(row: &PgRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Uuid, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.to_string()))
    }

    /// Timestamps with a time zone render as RFC 3339 in UTC; the rest keep their
    /// textual form.
    fn decode_temporal(row: &PgRow, idx: usize) -> Option<JsonValue> {
        use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

        if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
            return Some(JsonValue::String(v.to_rfc3339()));
        }
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return Some(JsonValue::String(
                v.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            ));
        }
        if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
            return Some(JsonValue::String(v.to_string()));
        }
        if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
            return Some(JsonValue::String(v.to_string()));
        }
        None
    }

    fn decode_text(row: &PgRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<String, _>(idx).ok().map(JsonValue::String)
    }

    fn decode_array(row: &PgRow, idx: usize) -> Option<JsonValue> {
        let number = |v: i64| JsonValue::Number(v.into());
        array_of::<i16>(row, idx, |v| number(v.into()))
            .or_else(|| array_of::<i32>(row, idx, |v| number(v.into())))
            .or_else(|| array_of::<i64>(row, idx, number))
            .or_else(|| array_of::<f32>(row, idx, |v| float_value(v as f64)))
            .or_else(|| array_of::<f64>(row, idx, float_value))
            .or_else(|| array_of::<bool>(row, idx, JsonValue::Bool))
            .or_else(|| array_of::<String>(row, idx, JsonValue::String))
            .or_else(|| array_of::<Uuid>(row, idx, |v| JsonValue::String(v.to_string())))
            .or_else(|| array_of::<BigDecimal>(row, idx, |v| JsonValue::String(v.to_string())))
    }

    fn array_of<T>(
        row: &PgRow,
        idx: usize,
        to_json: impl Fn(T) -> JsonValue,
    ) -> Option<JsonValue>
    where
        Vec<Option<T>>: for<'r> Decode<'r, Postgres> + Type<Postgres>,
    {
        let items = row.try_get::<Vec<Option<T>>, _>(idx).ok()?;
        Some(JsonValue::Array(
            items
                .into_iter()
                .map(|item| item.map(&to_json).unwrap_or(JsonValue::Null))
                .collect(),
        ))
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            // SQLite stores dates as text or numbers
            TypeCategory::Temporal
            | TypeCategory::Text
            | TypeCategory::Uuid
            | TypeCategory::Array
            | TypeCategory::Unknown => {
                decode_dynamic(row, idx)
            }
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<i64>, _>(idx) {
            Ok(Some(v)) => JsonValue::Number(v.into()),
            Ok(None) => JsonValue::Null,
            Err(_) => decode_dynamic(row, idx),
        }
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<f64>, _>(idx) {
            Ok(Some(v)) => float_value(v),
            Ok(None) => JsonValue::Null,
            Err(_) => decode_dynamic(row, idx),
        }
    }

    fn decode_binary(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &SqliteRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<String>, _>(idx) {
            Ok(Some(v)) => serde_json::from_str(&v).unwrap_or(JsonValue::String(v)),
            _ => JsonValue::Null,
        }
    }

    /// Columns without a usable declared type (expressions, untyped columns) take the
    /// storage class of the value itself.
    fn decode_dynamic(row: &SqliteRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return encode_binary(&v);
        }
        JsonValue::Null
    }
}

//! Binding `SqlValue`s to backend-specific queries.
//!
//! Values bind in order, so the n-th value lands on `$n`.

use crate::models::SqlValue;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{Encode, Postgres, Sqlite, Type};

/// NULL sent with an unspecified type (OID 0) so the server infers it from context.
/// A typed `None::<String>` would be rejected by non-text columns.
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Bind a value to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        SqlValue::Null => query.bind(UntypedNull),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a value to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        // SQLite has no JSON column type, store as text
        SqlValue::Json(v) => query.bind(v.to_string()),
    }
}

/// Bind every value of a statement to a PostgreSQL query.
pub(crate) fn bind_all_postgres<'q>(
    sql: &'q str,
    values: &'q [SqlValue],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    values
        .iter()
        .fold(sqlx::query(sql), |query, value| bind_postgres_param(query, value))
}

/// Bind every value of a statement to a SQLite query.
pub(crate) fn bind_all_sqlite<'q>(
    sql: &'q str,
    values: &'q [SqlValue],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    values
        .iter()
        .fold(sqlx::query(sql), |query, value| bind_sqlite_param(query, value))
}

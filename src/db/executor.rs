//! Statement execution.
//!
//! This module runs single statements on a pooled connection and chains batches of
//! statements inside one transaction, resolving `#name#` placeholders against the results
//! of earlier steps.
//!
//! # Architecture
//!
//! The executor uses backend-specific implementations organized in submodules:
//! - `postgres`: PostgreSQL statement execution
//! - `sqlite`: SQLite statement execution
//!
//! Each submodule exposes the same `run` function adapted to its backend's type system.
//! Statements with no values go over the simple protocol through `sqlx::raw_sql` so DDL and
//! other non-preparable statements work; statements with values are prepared and bound.

use crate::db::pool::{ConnectionPool, PooledConnection};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ResultSet, SqlValue, Statement, TransactionState};
use crate::sql::placeholder;
use sqlx::{Connection, Postgres, Sqlite, Transaction};
use tracing::{debug, error, info, warn};

impl PooledConnection {
    /// Execute one statement outside any transaction.
    pub(crate) async fn run(
        &mut self,
        sql: &str,
        values: &[SqlValue],
    ) -> Result<ResultSet, sqlx::Error> {
        match self {
            PooledConnection::Postgres(conn) => postgres::run(&mut **conn, sql, values).await,
            PooledConnection::SQLite(conn) => sqlite::run(&mut **conn, sql, values).await,
        }
    }
}

/// Execute one statement verbatim on a connection from `pool`.
///
/// Placeholders are not resolved here; `#name#` text reaches the database unchanged.
pub async fn execute_statement(pool: &ConnectionPool, statement: &Statement) -> DbResult<ResultSet> {
    debug!(
        sql = %statement.text,
        params = statement.values.len(),
        "Executing statement"
    );

    let mut conn = pool.acquire().await?;
    let result = conn.run(&statement.text, &statement.values).await;
    pool.release(conn);

    result.map_err(|e| DbError::statement(None, e))
}

/// Backend-specific transaction wrapper.
enum DbTransaction<'c> {
    Postgres(Transaction<'c, Postgres>),
    SQLite(Transaction<'c, Sqlite>),
}

impl<'c> DbTransaction<'c> {
    /// Issue BEGIN on a held connection.
    async fn begin(conn: &'c mut PooledConnection) -> Result<Self, sqlx::Error> {
        match conn {
            PooledConnection::Postgres(c) => Ok(DbTransaction::Postgres(c.begin().await?)),
            PooledConnection::SQLite(c) => Ok(DbTransaction::SQLite(c.begin().await?)),
        }
    }

    async fn run(&mut self, sql: &str, values: &[SqlValue]) -> Result<ResultSet, sqlx::Error> {
        match self {
            DbTransaction::Postgres(tx) => postgres::run(&mut **tx, sql, values).await,
            DbTransaction::SQLite(tx) => sqlite::run(&mut **tx, sql, values).await,
        }
    }

    async fn commit(self) -> Result<(), sqlx::Error> {
        match self {
            DbTransaction::Postgres(tx) => tx.commit().await,
            DbTransaction::SQLite(tx) => tx.commit().await,
        }
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        match self {
            DbTransaction::Postgres(tx) => tx.rollback().await,
            DbTransaction::SQLite(tx) => tx.rollback().await,
        }
    }
}

/// How a transaction ended, and therefore what happens to its connection.
enum Outcome {
    Committed(Vec<ResultSet>),
    /// Rolled back cleanly; the connection is reusable.
    RolledBack(DbError),
    /// The connection's transaction state is unknown; it must not be reused.
    Broken(DbError),
}

/// Runs an ordered batch of statements as one chained transaction.
///
/// Each statement sees the results of the statements before it through `#name#`
/// placeholders. Either every statement commits or none of them does. The transaction holds
/// one connection from start to finish and gives it back exactly once.
///
/// There is no timeout on a transaction once it has begun; only acquiring the connection can
/// time out.
#[derive(Debug, Clone)]
pub struct TransactionExecutor {
    pool: ConnectionPool,
}

impl TransactionExecutor {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Run `statements` in order inside one transaction.
    ///
    /// Returns one result set per statement. On failure nothing is committed and the error
    /// names the failed statement's index. An empty batch returns immediately without
    /// touching the pool.
    pub async fn run(&self, statements: &[Statement]) -> DbResult<Vec<ResultSet>> {
        if statements.is_empty() {
            debug!("Empty batch, nothing to execute");
            return Ok(Vec::new());
        }

        let transaction_id = generate_transaction_id();
        let mut conn = self.pool.acquire().await?;

        let outcome = drive(&mut conn, statements, &transaction_id).await;

        match outcome {
            Outcome::Committed(results) => {
                self.pool.release(conn);
                info!(
                    transaction_id = %transaction_id,
                    statements = statements.len(),
                    "Transaction committed"
                );
                Ok(results)
            }
            Outcome::RolledBack(err) => {
                self.pool.release(conn);
                info!(
                    transaction_id = %transaction_id,
                    index = ?err.statement_index(),
                    "Transaction rolled back"
                );
                Err(err)
            }
            Outcome::Broken(err) => {
                self.pool.discard(conn).await;
                Err(err)
            }
        }
    }
}

/// Take the transaction from BEGIN to COMMIT or ROLLBACK on `conn`.
async fn drive(conn: &mut PooledConnection, statements: &[Statement], transaction_id: &str) -> Outcome {
    let mut state = TransactionState::Idle;

    let mut tx = match DbTransaction::begin(conn).await {
        Ok(tx) => tx,
        Err(e) => {
            error!(transaction_id = %transaction_id, error = %e, "BEGIN failed");
            return Outcome::Broken(DbError::transaction("begin", e.to_string()));
        }
    };
    advance(&mut state, TransactionState::Began, transaction_id);

    let mut results: Vec<ResultSet> = Vec::with_capacity(statements.len());
    for (index, statement) in statements.iter().enumerate() {
        advance(&mut state, TransactionState::Executing(index), transaction_id);

        let sql = match placeholder::resolve(&statement.text, &results) {
            Ok(sql) => sql,
            Err(e) => {
                let cause = DbError::placeholder(index, e.key, e.column);
                return abort(tx, index, cause, &mut state, transaction_id).await;
            }
        };
        debug!(
            transaction_id = %transaction_id,
            index = index,
            sql = %sql,
            params = statement.values.len(),
            "Executing statement"
        );

        match tx.run(&sql, &statement.values).await {
            Ok(result) => results.push(result),
            Err(e) => {
                let cause = DbError::statement(Some(index), e);
                return abort(tx, index, cause, &mut state, transaction_id).await;
            }
        }
    }

    match tx.commit().await {
        Ok(()) => {
            advance(&mut state, TransactionState::Committed, transaction_id);
            Outcome::Committed(results)
        }
        Err(e) => {
            error!(transaction_id = %transaction_id, error = %e, "COMMIT failed");
            Outcome::Broken(DbError::transaction("commit", e.to_string()))
        }
    }
}

/// Roll back after step `index` failed with `cause`.
async fn abort(
    tx: DbTransaction<'_>,
    index: usize,
    cause: DbError,
    state: &mut TransactionState,
    transaction_id: &str,
) -> Outcome {
    warn!(
        transaction_id = %transaction_id,
        index = index,
        error = %cause,
        "Statement failed, rolling back transaction"
    );
    match tx.rollback().await {
        Ok(()) => {
            advance(state, TransactionState::RolledBack, transaction_id);
            Outcome::RolledBack(cause)
        }
        Err(rollback_err) => {
            error!(
                transaction_id = %transaction_id,
                index = index,
                error = %rollback_err,
                "Rollback failed, connection will be discarded"
            );
            Outcome::Broken(DbError::rollback(index, rollback_err, cause))
        }
    }
}

fn advance(state: &mut TransactionState, next: TransactionState, transaction_id: &str) {
    debug!(
        transaction_id = %transaction_id,
        from = %state,
        to = %next,
        "Transaction state change"
    );
    *state = next;
}

fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}

// =============================================================================
// Backend-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its backend.
// The code structure is intentionally parallel to make differences obvious.

mod postgres {
    use super::*;
    use crate::db::params::bind_all_postgres;
    use futures_util::TryStreamExt;
    use sqlx::Either;
    use sqlx::PgConnection;

    pub async fn run(
        conn: &mut PgConnection,
        sql: &str,
        values: &[SqlValue],
    ) -> Result<ResultSet, sqlx::Error> {
        use sqlx::Executor;

        let mut stream = if values.is_empty() {
            sqlx::raw_sql(sql).fetch_many(conn)
        } else {
            // A bound statement needs its rows and rows_affected from one round trip, which
            // only the multi-result stream reports.
            #[allow(deprecated)]
            let stream = conn.fetch_many(bind_all_postgres(sql, values));
            stream
        };

        let mut result = ResultSet::default();
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => result.rows_affected += done.rows_affected(),
                Either::Right(row) => {
                    let decoded = row.decode_row();
                    result.push_row(decoded.values, decoded.undecoded);
                }
            }
        }
        Ok(result)
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_all_sqlite;
    use futures_util::TryStreamExt;
    use sqlx::Either;
    use sqlx::SqliteConnection;

    pub async fn run(
        conn: &mut SqliteConnection,
        sql: &str,
        values: &[SqlValue],
    ) -> Result<ResultSet, sqlx::Error> {
        use sqlx::Executor;

        let mut stream = if values.is_empty() {
            sqlx::raw_sql(sql).fetch_many(conn)
        } else {
            // A bound statement needs its rows and rows_affected from one round trip, which
            // only the multi-result stream reports.
            #[allow(deprecated)]
            let stream = conn.fetch_many(bind_all_sqlite(sql, values));
            stream
        };

        let mut result = ResultSet::default();
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => result.rows_affected += done.rows_affected(),
                Either::Right(row) => {
                    let decoded = row.decode_row();
                    result.push_row(decoded.values, decoded.undecoded);
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_format() {
        let id = generate_transaction_id();
        assert!(id.starts_with("tx_"));
        assert_eq!(id.len(), 3 + 32);
        assert_ne!(id, generate_transaction_id());
    }

    #[test]
    fn test_advance_updates_state() {
        let mut state = TransactionState::Idle;
        advance(&mut state, TransactionState::Began, "tx_test");
        assert_eq!(state, TransactionState::Began);
        advance(&mut state, TransactionState::Executing(0), "tx_test");
        assert!(state.is_open());
        advance(&mut state, TransactionState::Committed, "tx_test");
        assert!(state.is_terminal());
    }

    #[tokio::test]
    async fn test_empty_batch_does_not_touch_pool() {
        // Unreachable server: any acquire would fail or hang until timeout.
        let config = crate::config::DbConfig::postgres("app", "pw", "appdb")
            .with_host("127.0.0.1")
            .with_port(1)
            .with_acquire_timeout(1);
        let pool = ConnectionPool::new(&config).unwrap();
        let executor = TransactionExecutor::new(pool.clone());

        let results = executor.run(&[]).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(pool.status().size, 0);
    }
}

//! Public entry point for running statements.
//!
//! A [`QueryGateway`] owns the current [`ConnectionPool`] and routes each call: one statement
//! runs directly on a pooled connection, a list of statements runs as one chained
//! transaction. Without a pool it builds one on first use from its [`ConfigProvider`].

use crate::config::{ConfigProvider, DbConfig, EnvConfig};
use crate::db::executor::{TransactionExecutor, execute_statement};
use crate::db::pool::ConnectionPool;
use crate::error::DbResult;
use crate::models::{QueryInput, QueryOutput, ResultSet, SqlValue, Statement};
use crate::sql::builder;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub struct QueryGateway {
    provider: Arc<dyn ConfigProvider>,
    pool: RwLock<Option<ConnectionPool>>,
}

impl std::fmt::Debug for QueryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryGateway")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl QueryGateway {
    /// Gateway that initializes its pool lazily from `provider`.
    pub fn new(provider: impl ConfigProvider + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
            pool: RwLock::new(None),
        }
    }

    /// Gateway that reads its configuration from the process environment.
    pub fn from_env() -> Self {
        Self::new(EnvConfig::new())
    }

    /// Gateway around an existing pool. Falls back to the environment only if the pool is
    /// later cleared by [`QueryGateway::close`].
    pub fn with_pool(pool: ConnectionPool) -> Self {
        Self {
            provider: Arc::new(EnvConfig::new()),
            pool: RwLock::new(Some(pool)),
        }
    }

    /// Initialize the pool.
    ///
    /// An explicit `config` always builds a new pool and replaces the current one. Callers
    /// still holding the old pool keep it until they finish; it is not migrated or closed.
    /// With `None`, an existing pool is kept and a missing one is built from the provider.
    pub async fn init(&self, config: Option<DbConfig>) -> DbResult<ConnectionPool> {
        let Some(config) = config else {
            return self.pool().await;
        };

        let pool = ConnectionPool::new(&config)?;
        let previous = self.pool.write().await.replace(pool.clone());
        if let Some(previous) = previous {
            info!(
                previous = %previous.target(),
                current = %pool.target(),
                "Replaced connection pool"
            );
        }
        Ok(pool)
    }

    /// Current pool, built from the provider on first use.
    pub async fn pool(&self) -> DbResult<ConnectionPool> {
        if let Some(pool) = self.pool.read().await.as_ref() {
            return Ok(pool.clone());
        }

        let mut slot = self.pool.write().await;
        // Another caller may have initialized it while we waited for the write lock
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }

        let config = self.provider.load()?;
        let pool = ConnectionPool::new(&config)?;
        *slot = Some(pool.clone());
        Ok(pool)
    }

    /// Run a single statement or a batch, whichever `input` is.
    pub async fn execute(&self, input: impl Into<QueryInput>) -> DbResult<QueryOutput> {
        match input.into() {
            QueryInput::Single(statement) => self.query(statement).await.map(QueryOutput::Single),
            QueryInput::Batch(statements) => {
                self.transaction(statements).await.map(QueryOutput::Batch)
            }
        }
    }

    /// Run one statement verbatim on any pooled connection.
    pub async fn query(&self, statement: impl Into<Statement>) -> DbResult<ResultSet> {
        let statement = statement.into();
        let pool = self.pool().await?;
        execute_statement(&pool, &statement).await
    }

    /// Run statements in order as one chained transaction.
    pub async fn transaction<I, S>(&self, statements: I) -> DbResult<Vec<ResultSet>>
    where
        I: IntoIterator<Item = S>,
        S: Into<Statement>,
    {
        let statements: Vec<Statement> = statements.into_iter().map(Into::into).collect();
        if statements.is_empty() {
            return Ok(Vec::new());
        }

        let pool = self.pool().await?;
        TransactionExecutor::new(pool).run(&statements).await
    }

    /// See [`builder::build_insert`].
    pub fn build_insert<I, K>(table: &str, fields: I) -> Option<Statement>
    where
        I: IntoIterator<Item = (K, Option<SqlValue>)>,
        K: AsRef<str>,
    {
        builder::build_insert(table, fields)
    }

    /// See [`builder::build_update`].
    pub fn build_update<I, K>(
        table: &str,
        fields: I,
        condition: Option<(&str, SqlValue)>,
    ) -> Option<Statement>
    where
        I: IntoIterator<Item = (K, Option<SqlValue>)>,
        K: AsRef<str>,
    {
        builder::build_update(table, fields, condition)
    }

    /// Close the current pool and forget it. The next call initializes a new one.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;

    #[tokio::test]
    async fn test_lazy_init_surfaces_configuration_error() {
        let gateway = QueryGateway::new(DbConfig {
            user: Some("app".to_string()),
            ..Default::default()
        });
        let err = gateway.query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_initialization() {
        // Invalid config: initializing would fail.
        let gateway = QueryGateway::new(DbConfig::default());
        let output = gateway.execute(Vec::<Statement>::new()).await.unwrap();
        assert_eq!(output, QueryOutput::Batch(Vec::new()));
    }

    #[tokio::test]
    async fn test_explicit_init_replaces_pool() {
        let gateway = QueryGateway::new(DbConfig::default());
        let first = gateway
            .init(Some(DbConfig::postgres("a", "pw", "one").with_port(1)))
            .await
            .unwrap();
        let second = gateway
            .init(Some(DbConfig::postgres("b", "pw", "two").with_port(1)))
            .await
            .unwrap();
        assert_ne!(first.target(), second.target());
        assert_eq!(gateway.pool().await.unwrap().target(), second.target());

        // init(None) keeps the existing pool
        let kept = gateway.init(None).await.unwrap();
        assert_eq!(kept.target(), second.target());
    }

    #[test]
    fn test_build_passthroughs() {
        let stmt = QueryGateway::build_insert("t", [("userId", Some(SqlValue::Int(1)))]).unwrap();
        assert_eq!(stmt.text, "INSERT INTO t (user_id) VALUES ($1)");
        assert!(QueryGateway::build_update("t", Vec::<(&str, Option<SqlValue>)>::new(), None).is_none());
    }
}

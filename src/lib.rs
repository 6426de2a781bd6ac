//! chainsql
//!
//! Runs SQL statements against PostgreSQL or SQLite through a bounded connection pool. A
//! single statement runs directly; a batch runs as one chained transaction where each
//! statement can reference columns returned by earlier statements with `#column#`
//! placeholders.
//!
//! ```no_run
//! use chainsql::QueryGateway;
//!
//! # async fn demo() -> chainsql::DbResult<()> {
//! let gateway = QueryGateway::from_env();
//! let results = gateway
//!     .transaction([
//!         "INSERT INTO users (name) VALUES ('ada') RETURNING id",
//!         "INSERT INTO audit (user_id) VALUES (#id#)",
//!     ])
//!     .await?;
//! assert_eq!(results.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sql;

pub use config::{ConfigProvider, DbConfig, EnvConfig, PoolOptions};
pub use db::{ConnectionPool, QueryGateway, TransactionExecutor};
pub use error::{DbError, DbResult};
pub use models::{QueryInput, QueryOutput, ResultSet, SqlValue, Statement};
pub use sql::{Fields, build_insert, build_update};

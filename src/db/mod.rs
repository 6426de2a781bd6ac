//! Database access layer.
//!
//! This module provides:
//! - Connection pool management
//! - Row decoding and parameter binding
//! - Single statement and chained transaction execution
//! - The query gateway that routes between them

pub mod executor;
pub mod gateway;
pub(crate) mod params;
pub mod pool;
pub mod types;

pub use executor::{TransactionExecutor, execute_statement};
pub use gateway::QueryGateway;
pub use pool::{ConnectionPool, DbPool, PoolStatus, PooledConnection};

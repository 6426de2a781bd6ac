//! Data models for chainsql.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{DatabaseType, TransactionState};
pub use query::{QueryInput, QueryOutput, ResultSet, Row, SqlValue, Statement, UndecodedCell};

//! Connection-related data models.
//!
//! This module defines the supported database backends and the states a chained
//! transaction moves through.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported database types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    #[value(name = "postgres", alias = "postgresql")]
    PostgreSQL,
    #[value(name = "sqlite")]
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::SQLite => None,
        }
    }

    /// Whether connecting requires user and password credentials.
    pub fn requires_credentials(&self) -> bool {
        matches!(self, Self::PostgreSQL)
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::PostgreSQL),
            "sqlite" | "sqlite3" => Ok(Self::SQLite),
            other => Err(format!(
                "Unknown database type '{}', expected 'postgres' or 'sqlite'",
                other
            )),
        }
    }
}

/// Lifecycle of a chained transaction.
///
/// `Idle -> Began -> Executing(0) -> ... -> Executing(n-1) -> Committed`, or `RolledBack`
/// from any executing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Idle,
    Began,
    Executing(usize),
    Committed,
    RolledBack,
}

impl TransactionState {
    /// Check if the transaction has ended (committed or rolled back).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    /// Check if the transaction holds an open BEGIN on its connection.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Began | Self::Executing(_))
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Began => write!(f, "began"),
            Self::Executing(i) => write!(f, "executing({})", i),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}

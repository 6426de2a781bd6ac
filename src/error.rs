//! Error types for chainsql.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Statement failures keep the underlying driver error as their `source` so callers can
//! inspect the database's own diagnostics.

use thiserror::Error;

/// Environment keys listed in configuration error suggestions.
const CONFIG_SUGGESTION: &str = "Pass a complete DbConfig or set DATABASE_URL, or DB_USER, \
     DB_PASSWORD and DB_DATABASE (optionally DB_HOST, DB_PORT, MAX_POOL, IDLE_TIMEOUT_MS)";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database improperly configured: {message}")]
    Configuration { message: String, suggestion: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Connection pool exhausted: no connection available within {timeout_secs}s")]
    PoolExhausted { timeout_secs: u64 },

    #[error("{}", statement_display(*index, message, sql_state.as_deref()))]
    Statement {
        /// Position of the failed statement within its batch, `None` for single statements.
        index: Option<usize>,
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        #[source]
        source: sqlx::Error,
    },

    #[error("Rollback failed after statement {index} failed: {message}")]
    Rollback {
        index: usize,
        message: String,
        #[source]
        statement_error: Box<DbError>,
    },

    #[error("Transaction error during {phase}: {message}")]
    Transaction { phase: String, message: String },

    /// A `#key#` placeholder matched a value the driver could not decode.
    #[error("Statement {index} failed: placeholder #{key}# refers to undecodable column {column}")]
    Placeholder {
        index: usize,
        key: String,
        column: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn statement_display(index: Option<usize>, message: &str, sql_state: Option<&str>) -> String {
    let position = match index {
        Some(i) => format!("Statement {} failed", i),
        None => "Statement failed".to_string(),
    };
    match sql_state {
        Some(code) => format!("{}: {} (SQLSTATE: {})", position, message, code),
        None => format!("{}: {}", position, message),
    }
}

impl DbError {
    /// Create a configuration error with the standard environment-key suggestion.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            suggestion: CONFIG_SUGGESTION.to_string(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a pool exhaustion error.
    pub fn pool_exhausted(timeout_secs: u64) -> Self {
        Self::PoolExhausted { timeout_secs }
    }

    /// Wrap a driver error raised while executing a statement.
    ///
    /// Pool-level failures (acquire timeout, closed pool) are not statement failures and are
    /// converted through `From<sqlx::Error>` instead.
    pub fn statement(index: Option<usize>, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => Self::from(err),
            err => {
                let (message, sql_state) = match &err {
                    sqlx::Error::Database(db_err) => (
                        db_err.message().to_string(),
                        db_err.code().map(|c| c.to_string()),
                    ),
                    other => (other.to_string(), None),
                };
                Self::Statement {
                    index,
                    message,
                    sql_state,
                    source: err,
                }
            }
        }
    }

    /// Create a rollback error wrapping the statement failure that triggered it.
    pub fn rollback(index: usize, rollback_err: sqlx::Error, statement_error: DbError) -> Self {
        Self::Rollback {
            index,
            message: rollback_err.to_string(),
            statement_error: Box::new(statement_error),
        }
    }

    /// Create a transaction error for a BEGIN or COMMIT failure.
    pub fn transaction(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transaction {
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Create a placeholder error for statement `index`.
    pub fn placeholder(index: usize, key: impl Into<String>, column: impl Into<String>) -> Self {
        Self::Placeholder {
            index,
            key: key.into(),
            column: column.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Configuration { suggestion, .. } => Some(suggestion),
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::PoolExhausted { .. } => {
                Some("Increase max_connections or acquire_timeout, or reduce concurrent load")
            }
            Self::Placeholder { .. } => {
                Some("Cast the referenced column to text in the statement that produces it")
            }
            _ => None,
        }
    }

    /// Index of the statement that failed, for statement, placeholder and rollback failures.
    pub fn statement_index(&self) -> Option<usize> {
        match self {
            Self::Statement { index, .. } => *index,
            Self::Placeholder { index, .. } | Self::Rollback { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Fatal errors leave the caller with nothing to retry against: a configuration that can
    /// never connect, or a connection whose transaction state is unknown.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Rollback { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::Configuration {
                message: msg.to_string(),
                suggestion: "Check the connection URL format and credentials".to_string(),
            },
            sqlx::Error::PoolTimedOut => DbError::pool_exhausted(0),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Re-initialize the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Tablegate Error Module
///
/// This module defines the error type shared by every layer of the crate:
/// configuration resolution, connection setup, query logging, statement
/// execution and argument validation.
use std::path::PathBuf;
use thiserror::Error;

/// Error type for tablegate.
///
/// Nothing in the crate retries or recovers; every variant propagates to
/// the immediate caller.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Missing or unresolvable module settings, raised before any
    /// connection attempt.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The driver refused or failed to open the module's database.
    #[error("Connection error for module '{module}': {message}")]
    Connection { module: String, message: String },

    /// The query log could not be created or written.
    #[error("Log file error for {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The driver rejected a statement at prepare or execute time.
    #[error("Statement error: {message} [{sql}]")]
    Statement { sql: String, message: String },

    /// Structured data was required but not supplied, or the supplied data
    /// left nothing to write.
    #[error("Argument error: {0}")]
    Argument(String),

    /// Database errors outside statement execution (row decoding, pragmas)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Wraps a driver error raised while preparing or running `sql`.
    pub fn statement(sql: &str, err: impl std::fmt::Display) -> Self {
        GatewayError::Statement {
            sql: sql.to_string(),
            message: err.to_string(),
        }
    }
}

/// Type alias for Result to use GatewayError as the error type.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Core Module for tablegate
///
/// Shared infrastructure: the error type and the database layer
/// (connections, statement caching, schema introspection, execution).

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{GatewayError, Result};

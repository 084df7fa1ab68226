// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod args;
pub mod config;
pub mod gateway;
pub mod query_log;
pub mod result_set;
pub mod value;

#[cfg(test)]
mod test_utils;

pub use crate::args::{normalize, Arg, Query};
pub use crate::config::{Config, ConnectionDescriptor, RowShape, DEFAULT_MODULE};
pub use crate::core::db::{ConnectionManager, Database, RawOutcome, TableSchema};
pub use crate::core::{GatewayError, Result};
pub use crate::gateway::{FieldValues, Gateway, Table};
pub use crate::result_set::{reindex_by_key, ResultSet};
pub use crate::value::{Data, Row, Value};

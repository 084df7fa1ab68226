/// Database Module
///
/// The database layer is split into four concerns:
/// - **Connection Management** (`connection.rs`): per-module handles, query
///   logging and transaction depth
/// - **Statement Caching** (`statement.rs`): prepared statements keyed by
///   SQL hash
/// - **Schema Introspection** (`schema.rs`): column and key metadata
/// - **Query Execution** (`query.rs`): binding values and collecting rows
///
/// All operations return the crate-wide `GatewayError`.
pub mod connection;
pub mod query;
pub mod schema;
pub mod statement;

pub use connection::{ConnectionManager, Database};
pub use query::RawOutcome;
pub use schema::{Column, KeyKind, TableSchema};
pub use statement::StatementCache;

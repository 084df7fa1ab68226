//! Per-table CRUD gateways.
//!
//! A [`Gateway`] is bound to one table on one module's [`Database`]. Bind
//! it by name with [`ConnectionManager::gateway`], or declare the
//! association once on a type with [`Table`] and use
//! [`ConnectionManager::table`].
//!
//! ```no_run
//! use tablegate::{Config, ConnectionManager, Data, Query, Table};
//!
//! struct Users;
//! impl Table for Users {
//!     const NAME: &'static str = "users";
//! }
//!
//! # fn main() -> tablegate::Result<()> {
//! let mut manager = ConnectionManager::new(Config::in_memory());
//! let users = manager.table::<Users>()?;
//! let id = users.insert(&Data::new().set("name", "insert"))?;
//! users.update(&Data::new().set("name", "update"), &Query::filter("WHERE pk=?").bind(id))?;
//! let rows = users.get(&Query::all())?;
//! # Ok(())
//! # }
//! ```
pub mod build;

use crate::args::{normalize, Arg, Query};
use crate::config::DEFAULT_MODULE;
use crate::core::db::connection::{ConnectionManager, Database};
use crate::core::db::schema::TableSchema;
use crate::core::Result;
use crate::query_log::CallSite;
use crate::result_set::{reindex_by_key, ResultSet};
use crate::value::{Data, Row, Value};
use build::{Columns, Statement};
use serde::de::DeserializeOwned;
use std::rc::Rc;
use tracing::warn;

/// Columns coerced to booleans on write unless a table says otherwise.
pub const DEFAULT_BOOLEAN_COLUMNS: &[&str] = &["Active", "Deleted"];

/// Static association of a type with a table and module.
pub trait Table {
    const NAME: &'static str;
    const MODULE: &'static str = DEFAULT_MODULE;

    fn boolean_columns() -> &'static [&'static str] {
        DEFAULT_BOOLEAN_COLUMNS
    }
}

/// Values selected by [`Gateway::get_field`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValues {
    /// One column selected: its values.
    Values(Vec<Value>),
    /// Two columns selected: first column paired with the second.
    Pairs(Vec<(Value, Value)>),
    /// Any other width: whole rows.
    Rows(Vec<Row>),
}

impl FieldValues {
    pub fn len(&self) -> usize {
        match self {
            FieldValues::Values(v) => v.len(),
            FieldValues::Pairs(p) => p.len(),
            FieldValues::Rows(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct Gateway {
    db: Rc<Database>,
    table: String,
    boolean_columns: Vec<String>,
}

impl Gateway {
    pub fn new(db: Rc<Database>, table: impl Into<String>) -> Self {
        Gateway {
            db,
            table: table.into(),
            boolean_columns: DEFAULT_BOOLEAN_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Replaces the columns coerced to booleans on write.
    pub fn with_boolean_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.boolean_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn database(&self) -> &Rc<Database> {
        &self.db
    }

    #[track_caller]
    pub fn schema(&self) -> Result<TableSchema> {
        self.db.describe(CallSite::here("Gateway::schema"), &self.table)
    }

    /// Selects `query.fields` and re-keys the rows by their first column
    /// when its values are unique. No rows is an empty result, not an error.
    #[track_caller]
    pub fn get(&self, query: &Query) -> Result<ResultSet> {
        let site = CallSite::here("Gateway::get");
        let rows = self.fetch(site, &build::select(&self.table, query))?;
        Ok(reindex_by_key(rows))
    }

    /// [`get`](Self::get) with loosely ordered `fields`, `predicate`,
    /// `values` arguments.
    #[track_caller]
    pub fn get_args(&self, args: Vec<Arg>) -> Result<ResultSet> {
        let query = normalize(args)?;
        self.get(&query)
    }

    /// Selects rows and deserializes each into `T`.
    #[track_caller]
    pub fn get_records<T: DeserializeOwned>(&self, query: &Query) -> Result<Vec<T>> {
        let site = CallSite::here("Gateway::get_records");
        self.fetch(site, &build::select(&self.table, query))?
            .iter()
            .map(Row::deserialize)
            .collect()
    }

    /// Selects one or two fields as bare values or key/value pairs.
    #[track_caller]
    pub fn get_field(&self, query: &Query) -> Result<FieldValues> {
        let site = CallSite::here("Gateway::get_field");
        let rows = self.fetch(site, &build::select(&self.table, query))?;
        let width = rows.first().map_or(1, Row::len);
        Ok(match width {
            1 => FieldValues::Values(
                rows.into_iter()
                    .filter_map(|row| row.into_values().into_iter().next())
                    .collect(),
            ),
            2 => FieldValues::Pairs(
                rows.into_iter()
                    .map(|row| {
                        let mut values = row.into_values().into_iter();
                        let key = values.next().unwrap_or(Value::Null);
                        (key, values.next().unwrap_or(Value::Null))
                    })
                    .collect(),
            ),
            _ => FieldValues::Rows(rows),
        })
    }

    /// Number of rows matching the query's predicate; 0 if the count comes
    /// back empty.
    #[track_caller]
    pub fn count(&self, query: &Query) -> Result<i64> {
        let site = CallSite::here("Gateway::count");
        let rows = self.fetch(site, &build::count(&self.table, query))?;
        Ok(rows
            .first()
            .and_then(|row| row.get("qty"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Inserts the known columns of `data` and returns the new row id.
    #[track_caller]
    pub fn insert(&self, data: &Data) -> Result<i64> {
        let site = CallSite::here("Gateway::insert");
        let columns = self.columns(site, data)?;
        self.run(site, &build::insert(&self.table, &columns))?;
        Ok(self.db.last_insert_id())
    }

    /// Updates the non-key columns of `data` on the rows matching `query`,
    /// or on the row matching the key columns in `data` when `query` has no
    /// predicate. Returns the affected row count.
    #[track_caller]
    pub fn update(&self, data: &Data, query: &Query) -> Result<usize> {
        let site = CallSite::here("Gateway::update");
        let columns = self.columns(site, data)?;
        self.run(site, &build::update(&self.table, &columns, query)?)
    }

    /// Inserts `data`, or on a key conflict updates the existing row with
    /// the non-key columns of `data` and `update_only`. Returns the id of
    /// the written row, or 0 when the conflict left nothing to update.
    #[track_caller]
    pub fn put(&self, data: &Data, update_only: Option<&Data>) -> Result<i64> {
        let site = CallSite::here("Gateway::put");
        let columns = self.columns(site, data)?;
        if columns.assignments.is_empty() {
            self.run(site, &build::insert(&self.table, &columns))?;
            return Ok(self.db.last_insert_id());
        }
        let extra = match update_only {
            Some(extra) => self.columns_for(&self.schema_at(site)?, extra),
            None => Columns::default(),
        };
        let rows = self.fetch(site, &build::upsert(&self.table, &columns, &extra))?;
        Ok(rows
            .first()
            .and_then(Row::first)
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Deletes the rows matching `query` and returns how many went.
    #[track_caller]
    pub fn delete(&self, query: &Query) -> Result<usize> {
        let site = CallSite::here("Gateway::delete");
        self.run(site, &build::delete(&self.table, query))
    }

    fn schema_at(&self, site: CallSite) -> Result<TableSchema> {
        self.db.describe(site, &self.table)
    }

    fn columns(&self, site: CallSite, data: &Data) -> Result<Columns> {
        let schema = self.schema_at(site)?;
        Ok(self.columns_for(&schema, data))
    }

    fn columns_for(&self, schema: &TableSchema, data: &Data) -> Columns {
        let columns = build::columns(schema, data, &self.boolean_columns);
        if !columns.dropped.is_empty() {
            warn!(table = %self.table, dropped = ?columns.dropped, "ignoring unknown columns");
        }
        columns
    }

    fn fetch(&self, site: CallSite, stmt: &Statement) -> Result<Vec<Row>> {
        self.db.fetch(site, Some(&self.table), &stmt.sql, &stmt.values)
    }

    fn run(&self, site: CallSite, stmt: &Statement) -> Result<usize> {
        self.db.run(site, Some(&self.table), &stmt.sql, &stmt.values)
    }
}

impl ConnectionManager {
    /// A gateway for `table` on `module`, connecting the module if needed.
    pub fn gateway(&mut self, module: &str, table: &str) -> Result<Gateway> {
        Ok(Gateway::new(self.connection(module)?, table))
    }

    /// A gateway for the table and module declared by `T`.
    pub fn table<T: Table>(&mut self) -> Result<Gateway> {
        Ok(self
            .gateway(T::MODULE, T::NAME)?
            .with_boolean_columns(T::boolean_columns().iter().copied()))
    }
}

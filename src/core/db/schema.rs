/// Schema Introspection Module
///
/// Column metadata for a single table: names, declared types and which
/// columns belong to the primary or a unique key. The gateway uses it to
/// drop unknown columns and to keep key columns out of SET clauses.

use crate::value::{Row, Value};
use std::collections::BTreeMap;

/// Column listing, one row per column in declaration order.
pub(crate) const COLUMNS_SQL: &str =
    "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1)";

/// Every column of every unique index, tagged with its index name.
pub(crate) const UNIQUE_INDEX_SQL: &str = "SELECT il.name AS index_name, ii.name AS column_name \
     FROM pragma_index_list(?1) AS il, pragma_index_info(il.name) AS ii \
     WHERE il.\"unique\" = 1";

/// Key classification of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    None,
    Primary,
    /// Sole column of a unique index.
    Unique,
}

/// Represents a table column with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// Declared type (e.g., "INTEGER", "TEXT"); empty when undeclared
    pub type_name: String,
    pub notnull: bool,
    pub key: KeyKind,
}

impl Column {
    pub fn is_key(&self) -> bool {
        self.key != KeyKind::None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Builds the schema from the results of `COLUMNS_SQL` and
    /// `UNIQUE_INDEX_SQL`.
    pub(crate) fn from_rows(name: &str, columns: &[Row], unique_index_columns: &[Row]) -> Self {
        let mut indexes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in unique_index_columns {
            let mut cells = row.values();
            if let (Some(Value::Text(index)), Some(Value::Text(column))) = (cells.next(), cells.next()) {
                indexes.entry(index.clone()).or_default().push(column.clone());
            }
        }
        let unique: Vec<&String> = indexes
            .values()
            .filter(|cols| cols.len() == 1)
            .map(|cols| &cols[0])
            .collect();

        let columns = columns
            .iter()
            .filter_map(|row| {
                let name = row.get("name")?.as_str()?.to_string();
                let type_name = row
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let notnull = row.get("notnull").and_then(Value::as_i64).unwrap_or(0) != 0;
                let pk = row.get("pk").and_then(Value::as_i64).unwrap_or(0) > 0;
                let key = if pk {
                    KeyKind::Primary
                } else if unique.iter().any(|u| **u == name) {
                    KeyKind::Unique
                } else {
                    KeyKind::None
                };
                Some(Column {
                    name,
                    type_name,
                    notnull,
                    key,
                })
            })
            .collect();

        TableSchema {
            name: name.to_string(),
            columns,
        }
    }

    /// Looks a column up the way SQLite resolves names, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.column(name).map_or(false, Column::is_key)
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_key())
    }
}

//! SQL text and bound values for each gateway operation.
//!
//! Builders take an already-described table schema and never touch the
//! database, so the statements they produce can be checked directly.
use crate::args::{coerce_bool, Query};
use crate::core::db::schema::TableSchema;
use crate::core::{GatewayError, Result};
use crate::value::{Data, Value};
use once_cell::sync::Lazy;
use regex::Regex;

/// Values shaped like `NAME(...)` are SQL function calls, written into the
/// statement text instead of bound.
static FUNCTION_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^[A-Z][A-Z0-9_]*\(.*\)$").unwrap());

/// A statement ready to prepare, with its placeholder values in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub values: Vec<Value>,
}

/// A writable column after schema filtering and coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: Value,
    pub key: bool,
}

/// Columns of `data` the table knows about, plus the names it does not.
#[derive(Debug, Default)]
pub struct Columns {
    pub assignments: Vec<Assignment>,
    pub dropped: Vec<String>,
}

impl Columns {
    fn keys(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter().filter(|a| a.key)
    }

    fn non_keys(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter().filter(|a| !a.key)
    }
}

pub fn is_function_value(value: &Value) -> bool {
    matches!(value, Value::Text(text) if FUNCTION_VALUE.is_match(text))
}

/// Double-quotes an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Keeps the columns of `data` present in `schema` and coerces the
/// `boolean_columns` (compared ignoring ASCII case).
pub fn columns(schema: &TableSchema, data: &Data, boolean_columns: &[String]) -> Columns {
    let mut out = Columns::default();
    for (name, value) in data.iter() {
        let Some(column) = schema.column(name) else {
            out.dropped.push(name.to_string());
            continue;
        };
        let value = if boolean_columns.iter().any(|b| b.eq_ignore_ascii_case(name)) {
            Value::Bool(coerce_bool(value))
        } else {
            value.clone()
        };
        out.assignments.push(Assignment {
            column: column.name.clone(),
            value,
            key: column.is_key(),
        });
    }
    out
}

/// Placeholder for `value`, or the function call itself.
fn slot(value: &Value, values: &mut Vec<Value>) -> String {
    match value {
        Value::Text(text) if is_function_value(value) => text.clone(),
        _ => {
            values.push(value.clone());
            "?".to_string()
        }
    }
}

fn set_list<'a>(assignments: impl Iterator<Item = &'a Assignment>, values: &mut Vec<Value>) -> String {
    assignments
        .map(|a| format!("{} = {}", quote_ident(&a.column), slot(&a.value, values)))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn select(table: &str, query: &Query) -> Statement {
    Statement {
        sql: format!("SELECT {} FROM {}{}", query.fields.trim(), quote_ident(table), query.clause()),
        values: query.values.clone(),
    }
}

pub fn count(table: &str, query: &Query) -> Statement {
    Statement {
        sql: format!("SELECT COUNT(1) AS qty FROM {}{}", quote_ident(table), query.clause()),
        values: query.values.clone(),
    }
}

pub fn delete(table: &str, query: &Query) -> Statement {
    Statement {
        sql: format!("DELETE FROM {}{}", quote_ident(table), query.clause()),
        values: query.values.clone(),
    }
}

/// `INSERT ... VALUES (...)`, or an all-defaults row when nothing is left.
pub fn insert(table: &str, columns: &Columns) -> Statement {
    let mut values = Vec::new();
    let sql = insert_head(table, columns, &mut values);
    Statement { sql, values }
}

fn insert_head(table: &str, columns: &Columns, values: &mut Vec<Value>) -> String {
    if columns.assignments.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table));
    }
    let names: Vec<String> = columns.assignments.iter().map(|a| quote_ident(&a.column)).collect();
    let slots: Vec<String> = columns
        .assignments
        .iter()
        .map(|a| slot(&a.value, values))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        slots.join(", ")
    )
}

/// `UPDATE ... SET` over the non-key columns.
///
/// Without a predicate, one is built from the key columns present in the
/// data. Predicate values are bound after the SET values.
pub fn update(table: &str, columns: &Columns, query: &Query) -> Result<Statement> {
    let mut values = Vec::new();

    if columns.non_keys().next().is_none() {
        return Err(GatewayError::Argument(format!(
            "no updatable columns for table '{}'",
            table
        )));
    }

    let (predicate, predicate_values) = match &query.predicate {
        Some(_) => (query.clause(), query.values.clone()),
        None => {
            if columns.keys().next().is_none() {
                return Err(GatewayError::Argument(format!(
                    "update of '{}' has no predicate and no key columns to match on",
                    table
                )));
            }
            let mut key_values = Vec::new();
            let conditions: Vec<String> = columns
                .keys()
                .map(|a| format!("{} = {}", quote_ident(&a.column), slot(&a.value, &mut key_values)))
                .collect();
            (format!(" WHERE {}", conditions.join(" AND ")), key_values)
        }
    };

    let sets = set_list(columns.non_keys(), &mut values);
    values.extend(predicate_values);
    Ok(Statement {
        sql: format!("UPDATE {} SET {}{}", quote_ident(table), sets, predicate),
        values,
    })
}

/// Insert-or-update on key conflict, returning the written row's id.
///
/// The update clause carries the non-key columns of `data`, overridden or
/// extended by `update_only`. Key columns never appear in it and function
/// values are always written literally.
pub fn upsert(table: &str, columns: &Columns, update_only: &Columns) -> Statement {
    let mut values = Vec::new();
    let head = insert_head(table, columns, &mut values);

    let mut updates: Vec<&Assignment> = columns.non_keys().collect();
    for extra in update_only.non_keys() {
        match updates.iter_mut().find(|a| a.column == extra.column) {
            Some(existing) => *existing = extra,
            None => updates.push(extra),
        }
    }

    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", set_list(updates.into_iter(), &mut values))
    };
    Statement {
        sql: format!("{} ON CONFLICT {} RETURNING rowid", head, action),
        values,
    }
}

/// Query Execution Module
///
/// Binds values to prepared statements and turns driver rows into [`Row`]s.

use crate::value::{Row, Value};
use rusqlite::{params_from_iter, Statement};

/// Result of a raw pass-through statement.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutcome {
    /// The statement produced a result set.
    Rows(Vec<Row>),
    /// The statement changed data.
    Affected { rows: usize, last_insert_id: i64 },
}

/// Runs a statement that produces rows and collects every row.
pub(crate) fn collect_rows(stmt: &mut Statement<'_>, values: &[Value]) -> rusqlite::Result<Vec<Row>> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(values.iter()))?;

    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let mut shaped = Row::new();
        for (i, name) in columns.iter().enumerate() {
            shaped.push(name.clone(), Value::from_ref(row.get_ref(i)?));
        }
        collected.push(shaped);
    }
    Ok(collected)
}

/// Runs a statement that changes data and returns the affected row count.
pub(crate) fn execute(stmt: &mut Statement<'_>, values: &[Value]) -> rusqlite::Result<usize> {
    stmt.execute(params_from_iter(values.iter()))
}

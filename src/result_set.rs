//! Re-keying of query results by their first column.
use crate::config::RowShape;
use crate::value::{Row, Value};
use serde_json::json;
use std::collections::HashSet;

/// A shaped query result.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSet {
    /// Sequentially indexed rows, as returned by the driver.
    Rows(Vec<Row>),
    /// Rows keyed by their (unique) first-column value.
    Keyed(Vec<(Value, Row)>),
    /// Unique values of a single-column result.
    Scalars(Vec<Value>),
}

impl Default for ResultSet {
    fn default() -> Self {
        ResultSet::Rows(Vec::new())
    }
}

/// Keys the result by the first column when its values are unique.
///
/// Multi-column rows are keyed by their first value and kept whole; a
/// single-column result becomes a list of bare values. If any two rows
/// share a key the rows come back unchanged, in order. Nothing is ever
/// dropped.
pub fn reindex_by_key(rows: Vec<Row>) -> ResultSet {
    let width = match rows.first() {
        Some(row) => row.len(),
        None => return ResultSet::Rows(rows),
    };
    if width == 0 || !keys_unique(&rows) {
        return ResultSet::Rows(rows);
    }

    if width == 1 {
        ResultSet::Scalars(
            rows.into_iter()
                .filter_map(|row| row.into_values().into_iter().next())
                .collect(),
        )
    } else {
        ResultSet::Keyed(
            rows.into_iter()
                .map(|row| {
                    let key = row.first().cloned().unwrap_or(Value::Null);
                    (key, row)
                })
                .collect(),
        )
    }
}

fn text_keys_unique(rows: &[(Value, Row)]) -> bool {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.iter().all(|(key, _)| seen.insert(key.to_string()))
}

fn keys_unique(rows: &[Row]) -> bool {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.iter()
        .all(|row| row.first().map_or(false, |key| seen.insert(key)))
}

impl ResultSet {
    pub fn len(&self) -> usize {
        match self {
            ResultSet::Rows(rows) => rows.len(),
            ResultSet::Keyed(rows) => rows.len(),
            ResultSet::Scalars(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_keyed(&self) -> bool {
        !matches!(self, ResultSet::Rows(_))
    }

    /// Looks a row up by key. Sequential results are looked up by position
    /// when `key` is a non-negative integer.
    pub fn get(&self, key: &Value) -> Option<&Row> {
        match self {
            ResultSet::Keyed(rows) => rows.iter().find(|(k, _)| k == key).map(|(_, row)| row),
            ResultSet::Rows(rows) => key
                .as_i64()
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| rows.get(i)),
            ResultSet::Scalars(_) => None,
        }
    }

    pub fn keys(&self) -> Vec<Value> {
        match self {
            ResultSet::Rows(rows) => (0..rows.len() as i64).map(Value::Integer).collect(),
            ResultSet::Keyed(rows) => rows.iter().map(|(k, _)| k.clone()).collect(),
            ResultSet::Scalars(values) => values.clone(),
        }
    }

    /// Back to plain rows, so the result can be shaped again.
    ///
    /// Scalars lose their column name and come back under `column`.
    pub fn into_rows(self, column: &str) -> Vec<Row> {
        match self {
            ResultSet::Rows(rows) => rows,
            ResultSet::Keyed(rows) => rows.into_iter().map(|(_, row)| row).collect(),
            ResultSet::Scalars(values) => values
                .into_iter()
                .map(|value| std::iter::once((column, value)).collect())
                .collect(),
        }
    }

    /// Renders the result for output. Keyed results become an object keyed
    /// by the key's text form, in result order; rows are objects or arrays
    /// per `shape`. When two distinct keys share a text form (`1` and `"1"`)
    /// the rows are rendered sequentially instead.
    pub fn to_json(&self, shape: RowShape) -> serde_json::Value {
        let render = |row: &Row| match shape {
            RowShape::Map => serde_json::to_value(row).unwrap_or_default(),
            RowShape::List => json!(row.values().collect::<Vec<_>>()),
        };
        match self {
            ResultSet::Rows(rows) => rows.iter().map(render).collect(),
            ResultSet::Keyed(rows) if !text_keys_unique(rows) => {
                rows.iter().map(|(_, row)| render(row)).collect()
            }
            ResultSet::Keyed(rows) => serde_json::Value::Object(
                rows.iter()
                    .map(|(key, row)| (key.to_string(), render(row)))
                    .collect(),
            ),
            ResultSet::Scalars(values) => json!(values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pk: i64, name: &str) -> Row {
        vec![("pk", Value::Integer(pk)), ("name", Value::from(name))]
            .into_iter()
            .collect()
    }

    fn single(name: &str) -> Row {
        std::iter::once(("name", Value::from(name))).collect()
    }

    #[test]
    fn test_empty_result_is_returned_as_is() {
        assert_eq!(reindex_by_key(vec![]), ResultSet::Rows(vec![]));
        assert!(reindex_by_key(vec![]).is_empty());
    }

    #[test]
    fn test_unique_keys_are_used() {
        let shaped = reindex_by_key(vec![row(3, "c"), row(1, "a")]);
        assert!(shaped.is_keyed());
        assert_eq!(shaped.keys(), vec![Value::Integer(3), Value::Integer(1)]);
        assert_eq!(shaped.get(&Value::Integer(1)), Some(&row(1, "a")));
        assert_eq!(shaped.get(&Value::Integer(0)), None);
    }

    #[test]
    fn test_single_row_is_keyed() {
        let shaped = reindex_by_key(vec![row(1, "insert")]);
        assert_eq!(shaped, ResultSet::Keyed(vec![(Value::Integer(1), row(1, "insert"))]));
    }

    #[test]
    fn test_collisions_keep_sequential_rows() {
        let rows = vec![row(1, "a"), row(1, "b"), row(2, "c")];
        let shaped = reindex_by_key(rows.clone());
        assert_eq!(shaped, ResultSet::Rows(rows.clone()));
        assert_eq!(shaped.get(&Value::Integer(1)), Some(&rows[1]));
    }

    #[test]
    fn test_single_column_becomes_scalars() {
        let shaped = reindex_by_key(vec![single("a"), single("b")]);
        assert_eq!(shaped, ResultSet::Scalars(vec![Value::from("a"), Value::from("b")]));

        let dupes = vec![single("a"), single("a")];
        assert_eq!(reindex_by_key(dupes.clone()), ResultSet::Rows(dupes));
    }

    #[test]
    fn test_reshaping_is_idempotent() {
        let once = reindex_by_key(vec![row(1, "a"), row(2, "b")]);
        let twice = reindex_by_key(once.clone().into_rows("pk"));
        assert_eq!(once, twice);

        let scalars = reindex_by_key(vec![single("a"), single("b")]);
        assert_eq!(reindex_by_key(scalars.clone().into_rows("name")), scalars);
    }

    #[test]
    fn test_to_json_shapes() {
        let shaped = reindex_by_key(vec![row(1, "insert")]);
        assert_eq!(
            shaped.to_json(RowShape::Map),
            json!({ "1": { "pk": 1, "name": "insert" } })
        );
        assert_eq!(shaped.to_json(RowShape::List), json!({ "1": [1, "insert"] }));
        assert_eq!(ResultSet::default().to_json(RowShape::Map), json!([]));
    }

    #[test]
    fn test_to_json_keeps_result_order() {
        let shaped = reindex_by_key(vec![row(10, "ten"), row(2, "two"), row(1, "one")]);
        let rendered = shaped.to_json(RowShape::List);
        let keys: Vec<&str> = rendered
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["10", "2", "1"]);
    }

    #[test]
    fn test_to_json_never_merges_keys() {
        let text_key: Row = vec![("k", Value::from("1")), ("v", Value::from("b"))]
            .into_iter()
            .collect();
        let int_key: Row = vec![("k", Value::Integer(1)), ("v", Value::from("a"))]
            .into_iter()
            .collect();
        let shaped = reindex_by_key(vec![int_key, text_key]);
        assert!(shaped.is_keyed());

        assert_eq!(
            shaped.to_json(RowShape::Map),
            json!([{ "k": 1, "v": "a" }, { "k": "1", "v": "b" }])
        );
    }
}

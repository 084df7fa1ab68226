//! Query arguments: the field list, an optional SQL clause with positional
//! placeholders, and the values bound to those placeholders.
//!
//! [`Query`] is the explicit form. [`normalize`] accepts the loose
//! positional form (`fields`, `predicate`, `values` in varying arities) and
//! reconciles it into a `Query`.
use crate::core::{GatewayError, Result};
use crate::value::Value;

/// Leading keywords that mark a string as a clause rather than a field list.
const PREDICATE_KEYWORDS: &str = " WHERE GROUP HAVING ORDER LIMIT PROCEDURE INTO FOR ";

pub const ALL_FIELDS: &str = "*";

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub fields: String,
    pub predicate: Option<String>,
    pub values: Vec<Value>,
}

impl Default for Query {
    fn default() -> Self {
        Query::all()
    }
}

impl Query {
    /// Every column, every row.
    pub fn all() -> Self {
        Query {
            fields: ALL_FIELDS.to_string(),
            predicate: None,
            values: Vec::new(),
        }
    }

    pub fn fields(fields: impl Into<String>) -> Self {
        let fields = fields.into();
        Query {
            fields: if fields.trim().is_empty() {
                ALL_FIELDS.to_string()
            } else {
                fields
            },
            ..Query::all()
        }
    }

    pub fn filter(predicate: impl Into<String>) -> Self {
        Query::all().and_filter(predicate)
    }

    /// Sets the clause appended after the table name.
    pub fn and_filter(mut self, predicate: impl Into<String>) -> Self {
        let predicate = predicate.into();
        self.predicate = (!predicate.trim().is_empty()).then_some(predicate);
        self
    }

    /// Binds the next positional placeholder.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.values.extend(values.into_iter().map(Into::into));
        self
    }

    /// `predicate` with a leading space, or nothing.
    pub(crate) fn clause(&self) -> String {
        self.predicate
            .as_deref()
            .map(|p| format!(" {}", p.trim()))
            .unwrap_or_default()
    }
}

/// One positional argument in the loose call form.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Sql(String),
    Value(Value),
    List(Vec<Value>),
}

impl Arg {
    fn as_sql(&self) -> Option<&str> {
        match self {
            Arg::Sql(s) => Some(s),
            _ => None,
        }
    }

    fn into_values(self) -> Vec<Value> {
        match self {
            Arg::Sql(s) => vec![Value::Text(s)],
            Arg::Value(v) => vec![v],
            Arg::List(vs) => vs,
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Sql(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Sql(s)
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Value(v)
    }
}

impl From<i64> for Arg {
    fn from(i: i64) -> Self {
        Arg::Value(Value::Integer(i))
    }
}

impl From<i32> for Arg {
    fn from(i: i32) -> Self {
        Arg::Value(Value::from(i))
    }
}

impl From<Vec<Value>> for Arg {
    fn from(vs: Vec<Value>) -> Self {
        Arg::List(vs)
    }
}

/// Reconciles positional arguments into a [`Query`].
///
/// - none: all fields, no predicate
/// - one: a predicate if it looks like one, else a field list
/// - two: `(predicate, values)` if the first looks like a predicate, else
///   `(fields, predicate)`
/// - three or more: `(fields, predicate, values)`; extra arguments are
///   ignored and an empty field list means all fields
pub fn normalize(args: Vec<Arg>) -> Result<Query> {
    let mut args = args.into_iter();
    let (first, second, third) = (args.next(), args.next(), args.next());

    match (first, second, third) {
        (None, _, _) => Ok(Query::all()),
        (Some(first), None, _) => {
            let text = sql_arg(&first, "fields or predicate")?;
            if looks_like_predicate(text) {
                Ok(Query::filter(text))
            } else {
                Ok(Query::fields(text))
            }
        }
        (Some(first), Some(second), None) => {
            let text = sql_arg(&first, "fields or predicate")?;
            if looks_like_predicate(text) {
                Ok(Query::filter(text).values(second.into_values()))
            } else {
                let predicate = sql_arg(&second, "predicate")?;
                Ok(Query::fields(text).and_filter(predicate))
            }
        }
        (Some(first), Some(second), Some(third)) => {
            let fields = first.as_sql().unwrap_or(ALL_FIELDS);
            let predicate = sql_arg(&second, "predicate")?;
            Ok(Query::fields(fields)
                .and_filter(predicate)
                .values(third.into_values()))
        }
    }
}

fn sql_arg<'a>(arg: &'a Arg, role: &str) -> Result<&'a str> {
    arg.as_sql().ok_or_else(|| {
        GatewayError::Argument(format!("expected SQL text for {}, got {:?}", role, arg))
    })
}

/// True when the first word of `text` is a clause keyword such as WHERE,
/// ORDER or LIMIT.
pub fn looks_like_predicate(text: &str) -> bool {
    match text.split_whitespace().next() {
        Some(token) => {
            PREDICATE_KEYWORDS.contains(&format!(" {} ", token.to_ascii_uppercase()))
        }
        None => false,
    }
}

/// Coerces a value to a boolean.
///
/// Text starting with `f` or `n` (after trimming, any case) is false, so
/// "false", "no" and "N" all read as false. Everything else follows plain
/// truthiness: empty text, "0", zero, null and empty blobs are false.
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Integer(i) => *i != 0,
        Value::Real(r) => *r != 0.0,
        Value::Text(s) => {
            let trimmed = s.trim().to_ascii_lowercase();
            match trimmed.chars().next() {
                Some('f') | Some('n') => false,
                _ => !(s.is_empty() || s == "0"),
            }
        }
        Value::Blob(b) => !b.is_empty(),
    }
}

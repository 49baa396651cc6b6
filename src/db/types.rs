//! Query result types for Sage.
//!
//! Defines the structures returned by the execution service.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Represents the result of executing a SQL query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    /// Column names, in select-list order.
    pub columns: Vec<String>,

    /// Rows of data, positionally matching `columns`.
    pub rows: Vec<Row>,

    /// Time taken to execute the query.
    #[serde(skip)]
    pub execution_time: Duration,

    /// Whether the result was truncated due to exceeding the row limit.
    pub was_truncated: bool,
}

impl QueryResult {
    /// Creates a query result with the given columns and rows.
    pub fn with_data(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            execution_time: Duration::ZERO,
            was_truncated: false,
        }
    }

    /// Sets the execution time.
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.execution_time = duration;
        self
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Views each row as an ordered column name to value mapping.
    pub fn row_maps(&self) -> impl Iterator<Item = Vec<(&str, &Value)>> + '_ {
        self.rows.iter().map(move |row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect()
        })
    }

    /// Renders the rows one per line as `{column: value, ...}`.
    pub fn format_rows(&self) -> String {
        if self.rows.is_empty() {
            return "No rows returned.".to_string();
        }

        let mut lines: Vec<String> = self
            .row_maps()
            .map(|pairs| {
                let fields = pairs
                    .iter()
                    .map(|(name, value)| format!("{}: {}", name, value))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{}}}", fields)
            })
            .collect();

        if self.was_truncated {
            lines.push(format!("(result truncated to {} rows)", self.rows.len()));
        }

        lines.join("\n")
    }
}

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// Represents a single value from a database query.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult::with_data(
            vec!["device_id".to_string(), "location".to_string()],
            vec![
                vec![Value::Int(1), Value::from("us-east")],
                vec![Value::Int(2), Value::Null],
            ],
        )
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::from("hello").to_string(), "hello");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_string(), "<3 bytes>");
    }

    #[test]
    fn test_value_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(7i64)), Value::Int(7));
    }

    #[test]
    fn test_row_maps_pair_columns_with_values() {
        let result = sample();
        let maps: Vec<_> = result.row_maps().collect();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0][0], ("device_id", &Value::Int(1)));
        assert_eq!(maps[0][1], ("location", &Value::from("us-east")));
    }

    #[test]
    fn test_format_rows_one_line_per_row() {
        let text = sample().format_rows();
        assert_eq!(
            text,
            "{device_id: 1, location: us-east}\n{device_id: 2, location: NULL}"
        );
    }

    #[test]
    fn test_format_rows_empty_and_truncated() {
        assert_eq!(QueryResult::default().format_rows(), "No rows returned.");

        let mut truncated = sample();
        truncated.was_truncated = true;
        assert!(truncated
            .format_rows()
            .ends_with("(result truncated to 2 rows)"));
    }
}

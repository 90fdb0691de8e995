//! Boundary to the external scanner provider
//!
//! The client never touches the provider's storage directly. It queries
//! tabular resources by URI, registers observers for change notifications
//! on a URI and sends fire-and-forget broadcasts, all through
//! [`ProviderContext`].

use rusqlite::types::Value;
use std::sync::Arc;

use crate::error::ClientError;
use crate::selection::Selection;

/// Identifies a registered [`ContentObserver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

/// Receives "something changed at this URI" notifications.
///
/// Called from the provider's dispatch thread; implementations must return
/// quickly.
pub trait ContentObserver: Send + Sync {
    /// A change was signalled at `uri`
    fn on_change(&self, uri: &str);
}

/// Application-scoped access to the scanner provider
pub trait ProviderContext: Send + Sync {
    /// Run a synchronous query against the resource at `uri`
    fn query(&self, uri: &str, selection: &Selection) -> Result<RowSet, ClientError>;

    /// Deliver changes signalled at exactly `uri` to `observer`
    fn register_observer(&self, uri: &str, observer: Arc<dyn ContentObserver>) -> ObserverId;

    /// Stop delivering to a registered observer; unknown ids are ignored
    fn unregister_observer(&self, id: ObserverId);

    /// Send a one-way signal to the channel named `action`
    fn send_broadcast(&self, action: &str) -> Result<(), ClientError>;
}

/// Materialized result of a provider query, in provider row order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Create a row set.
    ///
    /// Rows shorter than `columns` are accepted; reading a missing cell
    /// reports a malformed result.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Create a row set with no rows
    pub fn empty(columns: Vec<String>) -> Self {
        Self::new(columns, Vec::new())
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Index of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All rows
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Collect one column as integers. NULL and non-integer cells are errors.
    pub fn integer_column(&self, uri: &str, name: &str) -> Result<Vec<i64>, ClientError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| ClientError::missing_column(uri, name))?;

        self.rows
            .iter()
            .map(|row| match row.get(index) {
                Some(Value::Integer(v)) => Ok(*v),
                None => Err(missing_cell(uri, name)),
                Some(other) => Err(ClientError::malformed(
                    uri,
                    format!("Column {} is not an integer: {:?}", name, other),
                )),
            })
            .collect()
    }

    /// Collect one column as strings. NULL and non-text cells are errors.
    pub fn text_column(&self, uri: &str, name: &str) -> Result<Vec<String>, ClientError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| ClientError::missing_column(uri, name))?;

        self.rows
            .iter()
            .map(|row| match row.get(index) {
                Some(Value::Text(v)) => Ok(v.clone()),
                None => Err(missing_cell(uri, name)),
                Some(other) => Err(ClientError::malformed(
                    uri,
                    format!("Column {} is not text: {:?}", name, other),
                )),
            })
            .collect()
    }
}

fn missing_cell(uri: &str, name: &str) -> ClientError {
    ClientError::malformed(uri, format!("Row has no cell for column {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientErrorKind;

    const URI: &str = "content://test/media";

    fn sample() -> RowSet {
        RowSet::new(
            vec!["path".to_string(), "type".to_string()],
            vec![
                vec![Value::Text("/a.mp3".to_string()), Value::Integer(1)],
                vec![Value::Text("/b.mp4".to_string()), Value::Integer(2)],
            ],
        )
    }

    #[test]
    fn test_columns() {
        let rows = sample();
        assert_eq!(rows.column_index("type"), Some(1));
        assert_eq!(rows.column_index("size"), None);
        assert_eq!(rows.len(), 2);
        assert!(RowSet::empty(vec!["path".to_string()]).is_empty());
    }

    #[test]
    fn test_text_column_keeps_order() {
        let paths = sample().text_column(URI, "path").unwrap();
        assert_eq!(paths, vec!["/a.mp3", "/b.mp4"]);
    }

    #[test]
    fn test_missing_column_is_malformed() {
        let err = sample().text_column(URI, "title").unwrap_err();
        assert_eq!(err.kind, ClientErrorKind::MalformedResult);
    }

    #[test]
    fn test_null_cell_is_malformed() {
        let rows = RowSet::new(vec!["path".to_string()], vec![vec![Value::Null]]);
        let err = rows.text_column(URI, "path").unwrap_err();
        assert_eq!(err.kind, ClientErrorKind::MalformedResult);
    }

    #[test]
    fn test_short_row_is_malformed() {
        let rows = RowSet::new(
            vec!["type".to_string(), "path".to_string()],
            vec![
                vec![Value::Integer(1), Value::Text("/a.mp3".to_string())],
                vec![Value::Integer(2)],
            ],
        );
        let err = rows.text_column(URI, "path").unwrap_err();
        assert_eq!(err.kind, ClientErrorKind::MalformedResult);
        assert_eq!(rows.integer_column(URI, "type").unwrap(), vec![1, 2]);

        let rows = RowSet::new(vec!["path".to_string(), "state".to_string()], vec![vec![]]);
        assert!(rows.integer_column(URI, "state").is_err());
    }

    #[test]
    fn test_integer_column() {
        assert_eq!(sample().integer_column(URI, "type").unwrap(), vec![1, 2]);
        assert!(sample().integer_column(URI, "path").is_err());
    }
}

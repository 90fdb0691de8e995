//! Error types for the media scanner client

use thiserror::Error;

/// Error kinds that can occur while talking to the scanner provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    /// The provider cannot be reached or the addressed resource does not exist
    ResourceUnavailable,
    /// A query ran but its result lacks the expected columns
    MalformedResult,
    /// The client instance was destroyed and must not be used again
    Destroyed,
    /// Database operation failed
    DatabaseError,
    /// I/O error (config file access)
    IoError,
    /// Configuration could not be parsed
    ConfigError,
}

/// Represents an error raised by the client or its provider
#[derive(Debug, Error)]
#[error("{kind:?}: {message} (uri: {uri:?})")]
pub struct ClientError {
    /// The kind of error
    pub kind: ClientErrorKind,
    /// The resource URI involved, if any
    pub uri: Option<String>,
    /// Human-readable error message
    pub message: String,
}

impl ClientError {
    /// Create a new client error
    pub fn new(kind: ClientErrorKind, uri: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            uri,
            message: message.into(),
        }
    }

    /// Create a resource unavailable error
    pub fn unavailable(uri: &str, message: impl Into<String>) -> Self {
        Self::new(
            ClientErrorKind::ResourceUnavailable,
            Some(uri.to_string()),
            message,
        )
    }

    /// Create a malformed result error for a missing column
    pub fn missing_column(uri: &str, column: &str) -> Self {
        Self::new(
            ClientErrorKind::MalformedResult,
            Some(uri.to_string()),
            format!("Missing column: {}", column),
        )
    }

    /// Create a malformed result error
    pub fn malformed(uri: &str, message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::MalformedResult, Some(uri.to_string()), message)
    }

    /// Create the error returned by any operation on a destroyed client
    pub fn destroyed() -> Self {
        Self::new(
            ClientErrorKind::Destroyed,
            None,
            "Client has been destroyed",
        )
    }

    /// Create a database error
    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::DatabaseError, None, message)
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::ConfigError, None, message)
    }

    /// Whether this error means the provider could not answer a query.
    ///
    /// Callers fold these into "idle" for state queries and "absent" for
    /// media queries.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self.kind,
            ClientErrorKind::ResourceUnavailable
                | ClientErrorKind::MalformedResult
                | ClientErrorKind::DatabaseError
        )
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ClientErrorKind::IoError, None, err.to_string())
    }
}

impl From<rusqlite::Error> for ClientError {
    fn from(err: rusqlite::Error) -> Self {
        Self::database_error(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::config_error(err.to_string())
    }
}

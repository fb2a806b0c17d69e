//! Error types for minitable

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Kind of structural object an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Database,
    Table,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Database => f.write_str("Database"),
            ObjectKind::Table => f.write_str("Table"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // === Store Errors ===
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: ObjectKind, name: String },

    // === Request Errors ===
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Replication to {endpoint} failed: {reason}")]
    Replication { endpoint: String, reason: String },

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn already_exists(kind: ObjectKind, name: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    /// Does this error mean the target database or table is missing?
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::DatabaseNotFound(_) | Error::TableNotFound(_))
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> StatusCode {
        match self {
            Error::DatabaseNotFound(_) | Error::TableNotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists { .. } => StatusCode::CONFLICT,
            Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Error::Http(_) | Error::Replication { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Corrupted(format!("bincode: {}", e))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::DatabaseNotFound("shop".into()).to_http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::TableNotFound("orders".into()).to_http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::already_exists(ObjectKind::Table, "orders").to_http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::MethodNotAllowed("Only POST allowed".into()).to_http_status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            Error::MalformedRequest("eof".into()).to_http_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_already_exists_message() {
        let err = Error::already_exists(ObjectKind::Database, "shop");
        assert_eq!(err.to_string(), "Database already exists: shop");
    }
}

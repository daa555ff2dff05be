//! Error types for music-assist.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Invalid input: {0}")]
    BadInput(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        DatabaseError::Query(e.to_string())
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(e: serde_json::Error) -> Self {
        DatabaseError::Serialization(e.to_string())
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Provider overloaded (status {status}), retry after {retry_after:?}")]
    Overloaded {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Authentication failed")]
    AuthFailed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Web-search adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search not configured")]
    NotConfigured,

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Music-platform (GraphQL) errors.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Platform not configured")]
    NotConfigured,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("GraphQL error: {0}")]
    Graphql(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// SMTP errors.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("SMTP not configured")]
    NotConfigured,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Playlist catalog errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Catalog is empty")]
    Empty,
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for talktrack.
//!
//! This module defines all error types used throughout the talktrack crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for talktrack operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the store database.
    #[error("failed to open store at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Binding Errors ===
    /// Loading a bound value from the store failed.
    #[error("failed to hydrate '{key}': {message}")]
    Hydration {
        /// Store key being hydrated.
        key: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A key was bound twice with different value types.
    #[error("key '{key}' is already bound to a different value type")]
    BindingType {
        /// The conflicting store key.
        key: String,
    },

    // === HTTP Errors ===
    /// The HTTP request could not be completed.
    #[error("request to {url} failed: {source}")]
    Http {
        /// The requested URL.
        url: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("request to {url} returned HTTP {status}")]
    HttpStatus {
        /// The requested URL.
        url: String,
        /// The response status code.
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// The requested URL.
        url: String,
        /// Description of the decode failure.
        message: String,
    },

    // === Server Errors ===
    /// The talks file could not be read.
    #[error("failed to read talks file {path}: {source}")]
    TalksFileRead {
        /// Path to the talks file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The talks file does not contain valid JSON.
    #[error("talks file {path} is not valid JSON: {source}")]
    TalksFileParse {
        /// Path to the talks file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for talktrack operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("background task failed: {err}"))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a hydration error for the given key.
    #[must_use]
    pub fn hydration(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hydration {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Check if this error came from talking to the remote server.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::HttpStatus { .. } | Self::Decode { .. }
        )
    }

    /// The HTTP status carried by this error, if any.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

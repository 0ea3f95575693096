//! Error types for PaperWatch
//!
//! Provides:
//! - Distinct error types for each failure class of a run
//! - Machine-readable error codes
//! - A fatal/contained split so the runner knows what aborts a run

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Data quality (2xxx)
    UnresolvableItem,

    // Source errors (3xxx)
    SourceFailed,
    SourceTimeout,
    Cancelled,

    // Storage errors (7xxx)
    DatabaseError,
    ConnectionError,
    StoreError,

    // Internal errors (9xxx)
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::UnresolvableItem => 2001,

            ErrorCode::SourceFailed => 3001,
            ErrorCode::SourceTimeout => 3002,
            ErrorCode::Cancelled => 3003,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,
            ErrorCode::StoreError => 7003,

            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Item from '{origin}' has no resolvable canonical key")]
    UnresolvableItem { origin: String },

    #[error("Source {origin} failed: {message}")]
    SourceFailed { origin: String, message: String },

    #[error("Source {origin} timed out after {timeout_ms}ms")]
    SourceTimeout { origin: String, timeout_ms: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        AppError::Configuration {
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::UnresolvableItem { .. } => ErrorCode::UnresolvableItem,
            AppError::SourceFailed { .. } => ErrorCode::SourceFailed,
            AppError::SourceTimeout { .. } => ErrorCode::SourceTimeout,
            AppError::Cancelled => ErrorCode::Cancelled,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Store { .. } => ErrorCode::StoreError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Whether this error aborts a run.
    ///
    /// Source and per-item failures are contained by the pipeline. Only
    /// configuration and storage problems stop a run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Configuration { .. }
                | AppError::Database(_)
                | AppError::DatabaseConnection { .. }
                | AppError::Store { .. }
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

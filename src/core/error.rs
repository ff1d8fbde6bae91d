use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SigmaError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Path error: {0}")]
    PathError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Validating a cycle whose effective element set is empty.
    #[error("Empty plan: {0}")]
    EmptyPlan(String),
    /// Mutating a cycle that already has an archive.
    #[error("Immutable: {0}")]
    Immutable(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl SigmaError {
    /// Stable short code used in JSON envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            SigmaError::RusqliteError(_) => "sqlite",
            SigmaError::IoError(_) => "io",
            SigmaError::SerdeJsonError(_) => "json",
            SigmaError::ConfigError(_) => "config",
            SigmaError::PathError(_) => "path",
            SigmaError::ValidationError(_) => "validation",
            SigmaError::NotFound(_) => "not_found",
            SigmaError::EmptyPlan(_) => "empty_plan",
            SigmaError::Immutable(_) => "immutable",
            SigmaError::Forbidden(_) => "forbidden",
        }
    }
}

// src/error.rs

//! Unified error handling for the ticket crawler.

use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::services::FetchFailure;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// None of the anchor sources produced a starting id
    #[error(
        "no anchor id could be resolved: store is empty, no override was given and no seed files were found{}",
        seed_hint(.seed_dir)
    )]
    NoAnchor { seed_dir: Option<String> },

    /// Store file is missing its expected structure or cannot be written
    #[error("Store error for {path}: {message}")]
    Store { path: String, message: String },

    /// Snapshot file could not be written or decoded
    #[error("Snapshot error for {path}: {message}")]
    Snapshot { path: String, message: String },

    /// Every fetch strategy failed for a single id
    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    /// The full ticket list could not be downloaded
    #[error("Ticket list request failed: {0}")]
    ListFetch(String),
}

fn seed_hint(seed_dir: &Option<String>) -> String {
    match seed_dir {
        Some(dir) => format!(" in {dir}"),
        None => String::new(),
    }
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a store error for the given path.
    pub fn store(path: &Path, message: impl fmt::Display) -> Self {
        Self::Store {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Create a snapshot error for the given path.
    pub fn snapshot(path: &Path, message: impl fmt::Display) -> Self {
        Self::Snapshot {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

//! Error types for assetcount-core

use crate::types::Cursor;
use thiserror::Error;

/// A single page request that failed.
///
/// Carries the cursor that was being fetched so a run can be diagnosed or
/// resumed from the same position. `cursor` is `None` for the first page.
#[derive(Error, Debug, Clone)]
#[error("fetch failed at {}: {message}", describe_cursor(.cursor.as_ref()))]
pub struct FetchFailure {
    /// Cursor that was sent with the failed request
    pub cursor: Option<Cursor>,
    /// What went wrong (network, HTTP status, parse)
    pub message: String,
}

impl FetchFailure {
    pub fn new(cursor: Option<&Cursor>, message: impl Into<String>) -> Self {
        Self {
            cursor: cursor.cloned(),
            message: message.into(),
        }
    }

    /// True when the failure happened on the very first request.
    pub fn is_first_page(&self) -> bool {
        self.cursor.is_none()
    }
}

fn describe_cursor(cursor: Option<&Cursor>) -> String {
    match cursor {
        Some(c) => format!("cursor {}", c),
        None => "first page".to_string(),
    }
}

/// Main error type for the assetcount-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Page request failed
    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    /// Account seen in the asset stream is missing from the directory
    #[error("account {account_id} not found in account directory")]
    DirectoryLookup { account_id: String },

    /// Asset record without an account or type
    #[error("invalid asset record: {0}")]
    InvalidRecord(String),

    /// Report serialization or write failure
    #[error("export error: {0}")]
    Export(String),

    /// Blob missing from the store
    #[error("blob not found: {key}")]
    NotFound { key: String },

    /// Blob store read/write failure
    #[error("store error for {key}: {message}")]
    Store { key: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Export(e.to_string())
    }
}

/// Result type alias for assetcount-core
pub type Result<T> = std::result::Result<T, Error>;

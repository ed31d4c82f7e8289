//! Error types for Nosh.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NoshError {
    /// A non-expired pending clarification already exists for the user.
    #[error("A pending clarification already exists for user {0}")]
    Conflict(i64),

    /// Internal marker for a record found past its expiry. Never shown to
    /// users directly; handlers translate it into the expiry notice.
    #[error("Pending clarification for user {0} has expired")]
    Expired(i64),

    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NoshError>;

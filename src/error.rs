use std::path::PathBuf;

use thiserror::Error;

/// Failures that cross module seams. Command handlers wrap these in `anyhow`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    #[error("invalid JSON in {path}: {source}")]
    InvalidJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// A login page came back where JSON or image bytes were expected.
    /// Every later request would fail the same way.
    #[error("authentication expired (login page returned for {0})")]
    AuthExpired(String),

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("unexpected content for {url}: {reason}")]
    UnexpectedContent { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

//! Crate-wide error type and `Result` alias.

use thiserror::Error;

/// Convenient result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors surfaced by the crawler core.
///
/// Initialization failures (store, log file, input files) are fatal and
/// propagate to process exit; everything else is handled locally by the
/// retry machinery or the orchestrator.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("initialization error: {0}")]
    Initialization(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("response parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("login failed: {0}")]
    Login(String),
}

//! Error types for chess-eval-core

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The engine process failed to start or has exited. Requires a restart.
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A request was submitted while another one is still outstanding.
    #[error("Engine busy: an analysis request is already outstanding")]
    EngineBusy,

    #[error("Analysis timed out after {0:?}")]
    AnalysisTimeout(Duration),

    #[error("Opening book fetch failed: {0}")]
    RemoteFetchFailed(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("PGN parsing error: {0}")]
    Pgn(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether evaluation can continue with the next position after this error.
    ///
    /// Only a dead engine process stops a whole game evaluation.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::EngineUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

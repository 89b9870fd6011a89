//! Dashboard fetch error types.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid dashboard document: {0}")]
    Decode(String),

    #[error("Backend reported failure: {0}")]
    Backend(String),
}

impl FetchError {
    /// Label used for metrics and structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::HttpClient(_) => "client",
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::Status { .. } => "status",
            Self::Decode(_) => "decode",
            Self::Backend(_) => "backend",
        }
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

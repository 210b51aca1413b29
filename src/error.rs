//! Error types for Valence Flux

use thiserror::Error;

/// Errors that can occur anywhere in the affect pipeline
#[derive(Debug, Error)]
pub enum FluxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid emotion scores: {0}")]
    InvalidScores(String),

    #[error("Invalid smoothing window: {0} (must be finite and > 0)")]
    InvalidWindow(f64),

    #[error("Token store error: {0}")]
    TokenStore(String),

    #[error("Malformed log record: {0}")]
    MalformedRecord(String),
}

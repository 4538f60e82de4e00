//! Custom error types for docpilot

use thiserror::Error;

/// Main error type for docpilot operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transfer failed for '{filename}': {reason}")]
    Transfer { filename: String, reason: String },

    #[error("Backend returned HTTP {status}: {body}")]
    Backend {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Pipeline reported error: {0}")]
    PipelineReported(String),

    #[error("Stream reported error: {0}")]
    StreamReported(String),

    #[error("Stream ended without a terminal result")]
    StreamIncomplete,

    #[error("Stream aborted by caller")]
    StreamAborted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for docpilot operations
pub type Result<T> = std::result::Result<T, Error>;

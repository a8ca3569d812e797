//! Error types for Janus

use thiserror::Error;

/// Main error type for Janus operations
#[derive(Debug, Error)]
pub enum JanusError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// The XML parser could not be set up in a safe configuration.
    /// Fatal to the analyzer instance.
    #[error("Parser initialization error: {0}")]
    Initialization(String),

    #[error("Invalid scan target: {0}")]
    InvalidTarget(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl JanusError {
    /// True for failures that are the network's fault rather than the target's
    pub fn is_transport(&self) -> bool {
        matches!(self, JanusError::Transport(_) | JanusError::Cancelled)
    }
}

/// Result type alias for Janus operations
pub type Result<T> = std::result::Result<T, JanusError>;

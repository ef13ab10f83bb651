//! Error types for Reelcast.

use thiserror::Error;

/// Library-level error type for Reelcast operations.
#[derive(Error, Debug)]
pub enum ReelcastError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Script generation failed: {0}")]
    Script(String),

    #[error("Narration failed: {0}")]
    Narration(String),

    #[error("Image search failed: {0}")]
    ImageSearch(String),

    #[error("Image rejected: {0}")]
    ImageRejected(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Pipeline failed: {0}")]
    Pipeline(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Reelcast operations.
pub type Result<T> = std::result::Result<T, ReelcastError>;

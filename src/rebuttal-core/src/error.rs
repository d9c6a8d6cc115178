//! Error types for the rebuttal system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Invalid segment length: must be greater than zero, got {0}")]
    InvalidSegmentLength(usize),

    #[error("Speech fetch failed: {0}")]
    FetchFailed(String),

    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TTS error: {0}")]
    TtsError(String),

    #[error("Evidence error: {0}")]
    Evidence(String),
}

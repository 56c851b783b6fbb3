//! Error types for the voice pipeline core

use thiserror::Error;

/// Result type alias for voice pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice pipeline core
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session manager could not free a slot for a new session
    #[error("session capacity exceeded: {active} active, ceiling {ceiling}")]
    CapacityExceeded { active: usize, ceiling: usize },

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Response generation error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Context retrieval error
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// A capability call exceeded its stage timeout
    #[error("{stage} timed out after {millis}ms")]
    Timeout { stage: &'static str, millis: u128 },

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

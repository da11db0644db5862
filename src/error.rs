//! Error types for the chat application.

use crate::engine::EngineError;

/// Top-level error type for localchat.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Inference engine error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Chat page server error (bind, serve).
    #[error("server error: {0}")]
    Server(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ChatError>;

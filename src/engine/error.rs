//! Error types for the inference engine.
//!
//! Each error variant carries a stable error code (SCREAMING_SNAKE_CASE)
//! that is included in the Display output and accessible via [`EngineError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or missing configuration (unknown model id, empty model list).
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// The model could not be downloaded or built.
    pub const MODEL_LOAD_FAILED: &str = "MODEL_LOAD_FAILED";

    /// A completion was requested before any model was loaded.
    pub const NOT_READY: &str = "NOT_READY";

    /// The completion stream could not be started or broke mid-way.
    pub const STREAM_FAILED: &str = "STREAM_FAILED";

    /// The worker thread hosting the engine is no longer running.
    pub const WORKER_GONE: &str = "WORKER_GONE";
}

/// Errors produced by engine implementations.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    ConfigError(String),

    /// The model could not be downloaded or built.
    #[error("[{}] {}", error_codes::MODEL_LOAD_FAILED, .0)]
    LoadError(String),

    /// No model has been loaded yet.
    #[error("[{}] {}", error_codes::NOT_READY, .0)]
    NotReady(String),

    /// Streaming failed.
    #[error("[{}] {}", error_codes::STREAM_FAILED, .0)]
    StreamError(String),

    /// The worker thread exited or could not be started.
    #[error("[{}] {}", error_codes::WORKER_GONE, .0)]
    WorkerGone(String),
}

impl EngineError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => error_codes::CONFIG_INVALID,
            Self::LoadError(_) => error_codes::MODEL_LOAD_FAILED,
            Self::NotReady(_) => error_codes::NOT_READY,
            Self::StreamError(_) => error_codes::STREAM_FAILED,
            Self::WorkerGone(_) => error_codes::WORKER_GONE,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::ConfigError(m)
            | Self::LoadError(m)
            | Self::NotReady(m)
            | Self::StreamError(m)
            | Self::WorkerGone(m) => m,
        }
    }
}

//! Inference engine capability.
//!
//! The rest of the crate only talks to a [`ChatEngine`]. Two variants exist:
//! - [`LocalEngine`]: runs `mistralrs` directly on the caller's runtime.
//! - [`WorkerEngine`]: hosts any engine on a dedicated OS thread and bridges
//!   requests to it over channels.
//!
//! Completions are delivered as a [`FragmentStream`]: text deltas in arrival
//! order, ending normally on completion or with an `Err` item on failure.

pub mod error;
pub mod local;
pub mod worker;

pub use error::EngineError;
pub use local::{LocalEngine, MistralrsFactory};
pub use worker::WorkerEngine;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;

use crate::transcript::ChatTurn;

/// An incremental piece of generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Text to append to the in-progress reply.
    pub delta: String,
}

impl Fragment {
    pub fn new(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
        }
    }
}

/// A boxed stream of completion fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, EngineError>> + Send>>;

/// Shared, read-only handle to a ready engine.
pub type EngineHandle = Arc<dyn ChatEngine>;

/// A streaming chat completion backend.
#[async_trait]
pub trait ChatEngine: Send + Sync {
    /// Short label for logs (e.g. `"mistralrs"`, `"worker"`).
    fn name(&self) -> &str;

    /// Load `model_id`, replacing any previously loaded model.
    async fn reload(&self, model_id: &str) -> Result<(), EngineError>;

    /// Start a streamed completion over `turns`.
    ///
    /// The returned stream is lazy and yields fragments in generation order.
    async fn stream_completion(&self, turns: &[ChatTurn]) -> Result<FragmentStream, EngineError>;
}

/// Builds the in-context engine.
///
/// The bootstrapper calls this on the calling runtime in in-context mode, or
/// inside the worker thread in worker mode.
pub trait EngineFactory: Send + Sync + 'static {
    /// Construct a fresh engine with no model loaded.
    fn create(&self) -> Result<Box<dyn ChatEngine>, EngineError>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Result<Box<dyn ChatEngine>, EngineError> + Send + Sync + 'static,
{
    fn create(&self) -> Result<Box<dyn ChatEngine>, EngineError> {
        self()
    }
}

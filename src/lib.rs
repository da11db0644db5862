//! localchat: a browser chat front end for a locally hosted language model.
//!
//! # Architecture
//!
//! - **Engine**: a [`ChatEngine`] runs GGUF models via `mistralrs`, either on
//!   the caller's runtime or on a dedicated worker thread.
//! - **Bootstrap**: [`EngineBootstrapper`] builds the engine once, loads the
//!   default model and publishes an [`EngineStatus`].
//! - **Controller**: [`TranscriptController`] owns the transcript and folds
//!   streamed fragments into the in-progress reply.
//! - **Session**: [`ChatSession`] runs the controller as an actor.
//! - **UI**: [`ChatServer`] serves the page, pushes updates over SSE and
//!   accepts submissions.

pub mod bootstrap;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod session;
pub mod transcript;
pub mod ui;

#[cfg(test)]
pub(crate) mod test_utils;

pub use bootstrap::{BOOTSTRAP_FAILURE_MESSAGE, EngineBootstrapper, EngineStatus};
pub use config::AppConfig;
pub use controller::{STREAM_FAILURE_NOTICE, SubmitOutcome, TranscriptController, TranscriptSnapshot};
pub use engine::{ChatEngine, EngineError, EngineFactory, EngineHandle, Fragment, FragmentStream};
pub use error::{ChatError, Result};
pub use session::{ChatSession, SessionHandle};
pub use transcript::{ChatTurn, Role, Transcript};
pub use ui::ChatServer;

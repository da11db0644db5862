//! Transcript controller: the chat state machine.
//!
//! Owns the transcript, the pending input text and the streaming flag.
//! `Idle` accepts a submit; `Streaming` ignores it until the current reply
//! either completes or fails. On failure the in-progress reply is replaced
//! by [`STREAM_FAILURE_NOTICE`].

use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::engine::{EngineError, EngineHandle, Fragment};
use crate::transcript::{ChatTurn, Transcript};

/// Text shown in place of a reply that failed mid-generation.
pub const STREAM_FAILURE_NOTICE: &str = "Sorry, an error occurred.";

/// Point-in-time copy of everything the page needs to draw the chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranscriptSnapshot {
    pub turns: Vec<ChatTurn>,
    pub input: String,
    pub streaming: bool,
}

/// Result of a [`TranscriptController::submit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing to send, or a reply was still streaming.
    Rejected,
    /// The reply streamed to completion.
    Completed,
    /// The reply failed and now holds the failure notice.
    Failed,
}

/// Receives a snapshot after every state change during a submit.
pub trait Renderer: Send {
    fn render(&mut self, snapshot: &TranscriptSnapshot);
}

impl<F> Renderer for F
where
    F: FnMut(&TranscriptSnapshot) + Send,
{
    fn render(&mut self, snapshot: &TranscriptSnapshot) {
        self(snapshot)
    }
}

pub struct TranscriptController {
    engine: EngineHandle,
    transcript: Transcript,
    input: String,
    streaming: bool,
}

impl TranscriptController {
    /// Controller whose transcript starts with `greeting` as an assistant turn.
    /// An empty greeting starts an empty transcript.
    pub fn new(engine: EngineHandle, greeting: &str) -> Self {
        Self {
            engine,
            transcript: Transcript::with_greeting(greeting),
            input: String::new(),
            streaming: false,
        }
    }

    /// Controller seeded from config: the system prompt (if any) first, then
    /// the greeting.
    pub fn from_config(engine: EngineHandle, config: &AppConfig) -> Self {
        let mut transcript = Transcript::new();
        if !config.system_prompt.trim().is_empty() {
            transcript.push(ChatTurn::system(config.system_prompt.clone()));
        }
        if !config.greeting.is_empty() {
            transcript.push(ChatTurn::assistant(config.greeting.clone()));
        }
        Self {
            engine,
            transcript,
            input: String::new(),
            streaming: false,
        }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            turns: self.transcript.turns().to_vec(),
            input: self.input.clone(),
            streaming: self.streaming,
        }
    }

    /// Move the pending input into the transcript and enter `Streaming`.
    ///
    /// Returns the prompt to send: every turn up to and including the new
    /// user turn, without the empty assistant placeholder appended after it.
    /// Returns `None` (and changes nothing) while streaming or when the input
    /// is blank.
    pub fn begin_submit(&mut self) -> Option<Vec<ChatTurn>> {
        if self.streaming {
            debug!("submit ignored, a reply is still streaming");
            return None;
        }
        if self.input.trim().is_empty() {
            debug!("submit ignored, input is blank");
            return None;
        }

        let content = std::mem::take(&mut self.input);
        self.transcript.push(ChatTurn::user(content));
        let prompt = self.transcript.turns().to_vec();
        self.transcript.push(ChatTurn::assistant(""));
        self.streaming = true;
        info!(turns = prompt.len(), "submitting prompt");
        Some(prompt)
    }

    /// Append a fragment to the in-progress reply.
    pub fn apply_fragment(&mut self, fragment: &Fragment) -> bool {
        if !self.streaming {
            warn!("fragment arrived while idle, dropping it");
            return false;
        }
        self.transcript.append_to_last(&fragment.delta)
    }

    /// The reply completed normally.
    pub fn finish_stream(&mut self) {
        if self.streaming {
            debug!(
                chars = self.transcript.last().map_or(0, |t| t.content.len()),
                "reply complete"
            );
        }
        self.streaming = false;
    }

    /// The reply failed: log it and swap the partial reply for the notice.
    pub fn fail_stream(&mut self, failure: &EngineError) {
        error!(error = %failure, "completion failed");
        if self.streaming {
            self.transcript.replace_last(STREAM_FAILURE_NOTICE);
            self.streaming = false;
        }
    }

    /// Run one full submit cycle against the engine, rendering every change.
    pub async fn submit<R>(&mut self, renderer: &mut R) -> SubmitOutcome
    where
        R: Renderer + ?Sized,
    {
        let Some(prompt) = self.begin_submit() else {
            return SubmitOutcome::Rejected;
        };
        renderer.render(&self.snapshot());

        let mut stream = match self.engine.stream_completion(&prompt).await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail_stream(&e);
                renderer.render(&self.snapshot());
                return SubmitOutcome::Failed;
            }
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    self.apply_fragment(&fragment);
                    renderer.render(&self.snapshot());
                }
                Err(e) => {
                    self.fail_stream(&e);
                    renderer.render(&self.snapshot());
                    return SubmitOutcome::Failed;
                }
            }
        }

        self.finish_stream();
        renderer.render(&self.snapshot());
        SubmitOutcome::Completed
    }
}

impl std::fmt::Debug for TranscriptController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptController")
            .field("engine", &self.engine.name())
            .field("turns", &self.transcript.len())
            .field("streaming", &self.streaming)
            .finish()
    }
}

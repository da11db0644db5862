//! Chat session actor.
//!
//! A [`ChatSession`] task owns a [`TranscriptController`] and is driven by
//! [`SessionCommand`]s. While a reply streams it keeps accepting commands:
//! input edits are applied immediately and a second submit is ignored. Each
//! state change is published as a [`TranscriptSnapshot`] on a `watch` channel.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::controller::{TranscriptController, TranscriptSnapshot};
use crate::engine::{EngineError, Fragment, FragmentStream};
use crate::error::{ChatError, Result};

/// Capacity of the command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Commands accepted by the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Replace the pending input text.
    SetInput(String),
    /// Submit the pending input.
    Submit,
    /// Replace the pending input and submit it in one step.
    SubmitText(String),
}

/// Spawner for the session task.
pub struct ChatSession;

impl ChatSession {
    /// Spawn the session task on the current runtime.
    ///
    /// The task runs until every [`SessionHandle`] is dropped and any reply
    /// still streaming at that point has finished.
    pub fn spawn(controller: TranscriptController) -> SessionHandle {
        let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshots) = watch::channel(controller.snapshot());
        tokio::spawn(run(controller, command_rx, snapshot_tx));
        SessionHandle {
            commands,
            snapshots,
        }
    }
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<TranscriptSnapshot>,
}

impl SessionHandle {
    /// Replace the pending input text.
    pub async fn set_input(&self, text: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::SetInput(text.into())).await
    }

    /// Submit the pending input. A no-op while a reply is streaming.
    pub async fn submit(&self) -> Result<()> {
        self.send(SessionCommand::Submit).await
    }

    /// Set the input to `text` and submit it, with no other command in between.
    pub async fn submit_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::SubmitText(text.into())).await
    }

    /// Receiver for future snapshots.
    pub fn subscribe(&self) -> watch::Receiver<TranscriptSnapshot> {
        self.snapshots.clone()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> TranscriptSnapshot {
        self.snapshots.borrow().clone()
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ChatError::Channel("chat session has stopped".to_owned()))
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("running", &!self.commands.is_closed())
            .finish()
    }
}

async fn run(
    mut controller: TranscriptController,
    mut commands: mpsc::Receiver<SessionCommand>,
    snapshots: watch::Sender<TranscriptSnapshot>,
) {
    let mut active: Option<FragmentStream> = None;
    let mut accepting = true;
    info!(engine = controller.engine().name(), "chat session started");

    while accepting || active.is_some() {
        tokio::select! {
            item = next_fragment(&mut active), if active.is_some() => {
                match item {
                    Some(Ok(fragment)) => {
                        controller.apply_fragment(&fragment);
                    }
                    Some(Err(e)) => {
                        controller.fail_stream(&e);
                        active = None;
                    }
                    None => {
                        controller.finish_stream();
                        active = None;
                    }
                }
                snapshots.send_replace(controller.snapshot());
            }
            command = commands.recv(), if accepting => {
                match command {
                    Some(SessionCommand::SetInput(text)) => {
                        controller.set_input(text);
                        snapshots.send_replace(controller.snapshot());
                    }
                    Some(SessionCommand::Submit) => {
                        if let Some(stream) = start_reply(&mut controller, &snapshots).await {
                            active = Some(stream);
                        }
                    }
                    Some(SessionCommand::SubmitText(text)) => {
                        controller.set_input(text);
                        snapshots.send_replace(controller.snapshot());
                        if let Some(stream) = start_reply(&mut controller, &snapshots).await {
                            active = Some(stream);
                        }
                    }
                    None => {
                        debug!("all session handles dropped");
                        accepting = false;
                    }
                }
            }
        }
    }
    info!("chat session stopped");
}

/// Begin a submit and open the completion stream, publishing each change.
async fn start_reply(
    controller: &mut TranscriptController,
    snapshots: &watch::Sender<TranscriptSnapshot>,
) -> Option<FragmentStream> {
    let prompt = controller.begin_submit()?;
    snapshots.send_replace(controller.snapshot());
    let engine = Arc::clone(controller.engine());
    match engine.stream_completion(&prompt).await {
        Ok(stream) => Some(stream),
        Err(e) => {
            controller.fail_stream(&e);
            snapshots.send_replace(controller.snapshot());
            None
        }
    }
}

async fn next_fragment(
    active: &mut Option<FragmentStream>,
) -> Option<std::result::Result<Fragment, EngineError>> {
    use futures_util::StreamExt;

    match active {
        Some(stream) => stream.next().await,
        None => None,
    }
}

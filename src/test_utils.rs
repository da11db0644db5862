//! Shared test doubles used across unit test modules.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::engine::{ChatEngine, EngineError, Fragment, FragmentStream};
use crate::transcript::ChatTurn;

/// What the next `stream_completion` call does.
enum Script {
    Items(Vec<Result<Fragment, EngineError>>),
    Refuse(EngineError),
    Manual(mpsc::UnboundedReceiver<Result<Fragment, EngineError>>),
}

/// Deterministic engine: each completion consumes the next queued script.
///
/// With no scripts left, completions end immediately with no fragments.
#[derive(Default)]
pub(crate) struct ScriptedEngine {
    scripts: Mutex<VecDeque<Script>>,
    reload_error: Option<EngineError>,
    prompts: Mutex<Vec<Vec<ChatTurn>>>,
}

impl ScriptedEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn then_fragments(self, deltas: &[&str]) -> Self {
        self.push(Script::Items(
            deltas.iter().map(|d| Ok(Fragment::new(*d))).collect(),
        ))
    }

    pub(crate) fn then_fragments_and_error(self, deltas: &[&str], error: EngineError) -> Self {
        let mut items: Vec<_> = deltas.iter().map(|d| Ok(Fragment::new(*d))).collect();
        items.push(Err(error));
        self.push(Script::Items(items))
    }

    pub(crate) fn then_refuse(self, error: EngineError) -> Self {
        self.push(Script::Refuse(error))
    }

    /// Queue a completion whose fragments are fed by the returned sender.
    /// Dropping the sender ends the stream normally.
    pub(crate) fn then_manual(
        self,
    ) -> (Self, mpsc::UnboundedSender<Result<Fragment, EngineError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.push(Script::Manual(rx)), tx)
    }

    pub(crate) fn failing_reload(mut self, error: EngineError) -> Self {
        self.reload_error = Some(error);
        self
    }

    pub(crate) fn prompts(&self) -> Vec<Vec<ChatTurn>> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    fn push(self, script: Script) -> Self {
        self.scripts.lock().expect("scripts lock").push_back(script);
        self
    }
}

#[async_trait]
impl ChatEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn reload(&self, _model_id: &str) -> Result<(), EngineError> {
        match &self.reload_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn stream_completion(&self, turns: &[ChatTurn]) -> Result<FragmentStream, EngineError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(turns.to_vec());
        let next = self.scripts.lock().expect("scripts lock").pop_front();
        match next {
            Some(Script::Items(items)) => Ok(Box::pin(futures_util::stream::iter(items))),
            Some(Script::Refuse(e)) => Err(e),
            Some(Script::Manual(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            None => Ok(Box::pin(futures_util::stream::empty())),
        }
    }
}

//! Shared helpers for integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use localchat::{
    AppConfig, ChatEngine, ChatTurn, EngineError, EngineFactory, EngineStatus, Fragment,
    FragmentStream,
};
use tokio::sync::watch;

/// One scripted completion: fragments, then an optional terminal error.
#[derive(Clone)]
pub(crate) struct Reply {
    pub(crate) deltas: Vec<&'static str>,
    pub(crate) error: Option<EngineError>,
}

impl Reply {
    pub(crate) fn ok(deltas: &[&'static str]) -> Self {
        Self {
            deltas: deltas.to_vec(),
            error: None,
        }
    }

    pub(crate) fn failing(deltas: &[&'static str], error: EngineError) -> Self {
        Self {
            deltas: deltas.to_vec(),
            error: Some(error),
        }
    }
}

/// Engine replaying queued replies in order and recording every prompt.
pub(crate) struct ScriptedEngine {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Arc<Mutex<Vec<Vec<ChatTurn>>>>,
    reload_error: Option<EngineError>,
}

impl ScriptedEngine {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Arc::new(Mutex::new(Vec::new())),
            reload_error: None,
        }
    }

    pub(crate) fn failing_reload(mut self, error: EngineError) -> Self {
        self.reload_error = Some(error);
        self
    }

    /// Shared view of the recorded prompts, usable after the engine moves.
    pub(crate) fn prompt_log(&self) -> Arc<Mutex<Vec<Vec<ChatTurn>>>> {
        Arc::clone(&self.prompts)
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
        self.prompts.lock().unwrap().push(turns.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::ok(&[]));
        let mut items: Vec<Result<Fragment, EngineError>> =
            reply.deltas.iter().map(|d| Ok(Fragment::new(*d))).collect();
        if let Some(e) = reply.error {
            items.push(Err(e));
        }
        Ok(Box::pin(futures_util::stream::iter(items)))
    }
}

/// Factory that hands out a single prepared engine.
pub(crate) fn factory_for(engine: ScriptedEngine) -> Arc<dyn EngineFactory> {
    let slot = Mutex::new(Some(engine));
    Arc::new(move || -> Result<Box<dyn ChatEngine>, EngineError> {
        slot.lock()
            .unwrap()
            .take()
            .map(|e| Box::new(e) as Box<dyn ChatEngine>)
            .ok_or_else(|| EngineError::LoadError("engine already built".into()))
    })
}

/// Default config with the page server on an ephemeral local port.
pub(crate) fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.ui.host = "127.0.0.1".to_owned();
    config.ui.port = 0;
    config
}

/// Wait for bootstrap to settle, failing the test after five seconds.
pub(crate) async fn settle(status: &mut watch::Receiver<EngineStatus>) -> EngineStatus {
    tokio::time::timeout(
        Duration::from_secs(5),
        localchat::bootstrap::wait_settled(status),
    )
    .await
    .expect("bootstrap did not settle")
}

/// Poll `GET url` until the body satisfies `pred`; returns the last body.
pub(crate) async fn poll_page(url: &str, pred: impl Fn(&str) -> bool) -> String {
    let client = reqwest::Client::new();
    let mut body = String::new();
    for _ in 0..100 {
        body = client
            .get(url)
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        if pred(&body) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    body
}

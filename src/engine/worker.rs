//! Worker-backed engine.
//!
//! The engine is built and driven on a dedicated OS thread with its own
//! current-thread tokio runtime, so model loading and token generation never
//! compete with the chat page server for the caller's runtime. The handle
//! side only sends [`WorkerRequest`]s and reads replies back.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::{ChatEngine, EngineError, EngineFactory, Fragment, FragmentStream};
use crate::transcript::ChatTurn;

/// Name of the thread hosting the engine.
pub const WORKER_THREAD_NAME: &str = "localchat-engine-worker";

/// Capacity of each per-completion reply channel.
const REPLY_CHANNEL_CAPACITY: usize = 64;

/// Messages from the handle to the worker thread.
enum WorkerRequest {
    Reload {
        model_id: String,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Complete {
        turns: Vec<ChatTurn>,
        replies: mpsc::Sender<WorkerReply>,
    },
}

/// Messages from the worker thread back to a completion stream.
enum WorkerReply {
    Fragment(Fragment),
    Failed(EngineError),
    Done,
}

/// Handle to an engine hosted on a dedicated worker thread.
///
/// Dropping the handle closes the request channel and lets the thread exit.
pub struct WorkerEngine {
    requests: mpsc::UnboundedSender<WorkerRequest>,
}

impl WorkerEngine {
    /// Spawn the worker thread. The engine itself is built inside the thread
    /// by `factory`; a construction failure is reported to the first request.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::WorkerGone`] if the thread cannot be spawned.
    pub fn spawn(factory: Arc<dyn EngineFactory>) -> Result<Self, EngineError> {
        let (requests, request_rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build();
                match runtime {
                    Ok(rt) => rt.block_on(serve(factory, request_rx)),
                    Err(e) => error!("failed to create engine worker runtime: {e}"),
                }
            })
            .map_err(|e| EngineError::WorkerGone(format!("failed to spawn engine worker: {e}")))?;

        info!("engine worker thread started");
        Ok(Self { requests })
    }

    fn send(&self, request: WorkerRequest) -> Result<(), EngineError> {
        self.requests
            .send(request)
            .map_err(|_| EngineError::WorkerGone("engine worker is not running".to_owned()))
    }
}

impl std::fmt::Debug for WorkerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerEngine")
            .field("running", &!self.requests.is_closed())
            .finish()
    }
}

#[async_trait]
impl ChatEngine for WorkerEngine {
    fn name(&self) -> &str {
        "worker"
    }

    async fn reload(&self, model_id: &str) -> Result<(), EngineError> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(WorkerRequest::Reload {
            model_id: model_id.to_owned(),
            reply,
        })?;
        reply_rx
            .await
            .map_err(|_| EngineError::WorkerGone("engine worker dropped reload reply".to_owned()))?
    }

    async fn stream_completion(&self, turns: &[ChatTurn]) -> Result<FragmentStream, EngineError> {
        let (replies, mut reply_rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);
        self.send(WorkerRequest::Complete {
            turns: turns.to_vec(),
            replies,
        })?;

        let stream = async_stream::stream! {
            loop {
                match reply_rx.recv().await {
                    Some(WorkerReply::Fragment(fragment)) => yield Ok(fragment),
                    Some(WorkerReply::Failed(e)) => {
                        yield Err(e);
                        break;
                    }
                    Some(WorkerReply::Done) => break,
                    None => {
                        yield Err(EngineError::WorkerGone(
                            "engine worker stopped mid-stream".to_owned(),
                        ));
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Worker thread main loop. Requests are served one at a time in arrival order.
async fn serve(
    factory: Arc<dyn EngineFactory>,
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
) {
    let engine = factory.create();
    match &engine {
        Ok(engine) => info!("engine worker hosting `{}` engine", engine.name()),
        Err(e) => error!("engine worker failed to build engine: {e}"),
    }

    while let Some(request) = requests.recv().await {
        match request {
            WorkerRequest::Reload { model_id, reply } => {
                let result = match &engine {
                    Ok(engine) => engine.reload(&model_id).await,
                    Err(e) => Err(e.clone()),
                };
                let _ = reply.send(result);
            }
            WorkerRequest::Complete { turns, replies } => {
                let engine = match &engine {
                    Ok(engine) => engine,
                    Err(e) => {
                        let _ = replies.send(WorkerReply::Failed(e.clone())).await;
                        continue;
                    }
                };
                pump_completion(engine.as_ref(), &turns, &replies).await;
            }
        }
    }
    debug!("engine worker request channel closed, exiting");
}

async fn pump_completion(
    engine: &dyn ChatEngine,
    turns: &[ChatTurn],
    replies: &mpsc::Sender<WorkerReply>,
) {
    let mut stream = match engine.stream_completion(turns).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = replies.send(WorkerReply::Failed(e)).await;
            return;
        }
    };

    while let Some(item) = stream.next().await {
        let reply = match item {
            Ok(fragment) => WorkerReply::Fragment(fragment),
            Err(e) => {
                let _ = replies.send(WorkerReply::Failed(e)).await;
                return;
            }
        };
        if replies.send(reply).await.is_err() {
            debug!("completion consumer dropped, abandoning stream");
            return;
        }
    }
    let _ = replies.send(WorkerReply::Done).await;
}

//! Engine bootstrap: build the engine once and load the default model.
//!
//! [`EngineBootstrapper::initialize`] spawns a single background attempt and
//! hands back a `watch` receiver. The status starts at
//! [`EngineStatus::Loading`] and settles exactly once on either `Ready` or
//! `Error`. There is no retry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::engine::{
    ChatEngine, EngineError, EngineFactory, EngineHandle, MistralrsFactory, WorkerEngine,
};

/// Message shown to the user when bootstrap fails. Details only go to the log.
pub const BOOTSTRAP_FAILURE_MESSAGE: &str =
    "Failed to initialize the chat engine. Please try again later.";

/// Engine lifecycle as seen by the rest of the application.
#[derive(Clone)]
pub enum EngineStatus {
    /// Bootstrap is still running.
    Loading,
    /// Bootstrap failed; carries a user-safe message.
    Error(String),
    /// The engine is ready for completions.
    Ready(EngineHandle),
}

impl EngineStatus {
    /// Whether bootstrap has finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The engine handle, if ready.
    pub fn handle(&self) -> Option<&EngineHandle> {
        match self {
            Self::Ready(handle) => Some(handle),
            _ => None,
        }
    }
}

impl std::fmt::Debug for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "Loading"),
            Self::Error(message) => f.debug_tuple("Error").field(message).finish(),
            Self::Ready(handle) => f.debug_tuple("Ready").field(&handle.name()).finish(),
        }
    }
}

/// Owns the engine status and runs the one-shot initialization.
pub struct EngineBootstrapper {
    config: AppConfig,
    factory: Arc<dyn EngineFactory>,
    status: Arc<watch::Sender<EngineStatus>>,
    started: AtomicBool,
}

impl EngineBootstrapper {
    /// Bootstrapper that builds a `mistralrs` engine from `config`.
    pub fn new(config: AppConfig) -> Self {
        let factory = Arc::new(MistralrsFactory::new(config.clone()));
        Self::with_factory(config, factory)
    }

    /// Bootstrapper with a custom engine factory.
    pub fn with_factory(config: AppConfig, factory: Arc<dyn EngineFactory>) -> Self {
        let (status, _) = watch::channel(EngineStatus::Loading);
        Self {
            config,
            factory,
            status: Arc::new(status),
            started: AtomicBool::new(false),
        }
    }

    /// Observe the engine status.
    pub fn status(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    /// Start the single bootstrap attempt in the background.
    ///
    /// Must be called from within a tokio runtime. Later calls do not start a
    /// second attempt; they only return another status receiver.
    pub fn initialize(&self) -> watch::Receiver<EngineStatus> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("engine bootstrap already started");
            return self.status();
        }

        let config = self.config.clone();
        let factory = Arc::clone(&self.factory);
        let status = Arc::clone(&self.status);
        info!(
            worker = config.use_worker,
            "starting engine bootstrap"
        );
        tokio::spawn(async move {
            let settled = match bring_up(&config, factory).await {
                Ok(handle) => {
                    info!(engine = handle.name(), "engine ready");
                    EngineStatus::Ready(handle)
                }
                Err(e) => {
                    error!(error = %e, "failed to initialize engine");
                    EngineStatus::Error(BOOTSTRAP_FAILURE_MESSAGE.to_owned())
                }
            };
            status.send_replace(settled);
        });

        self.status()
    }
}

/// Build the engine in the configured mode and load the first model.
async fn bring_up(
    config: &AppConfig,
    factory: Arc<dyn EngineFactory>,
) -> Result<EngineHandle, EngineError> {
    config
        .validate()
        .map_err(|e| EngineError::ConfigError(e.to_string()))?;
    let model_id = config
        .default_model()
        .map(|m| m.model_id.clone())
        .ok_or_else(|| EngineError::ConfigError("no models configured".to_owned()))?;

    let handle: EngineHandle = if config.use_worker {
        Arc::new(WorkerEngine::spawn(factory)?)
    } else {
        Arc::<dyn ChatEngine>::from(factory.create()?)
    };

    info!(engine = handle.name(), model_id = %model_id, "loading default model");
    handle.reload(&model_id).await?;
    Ok(handle)
}

/// Wait until `status` leaves [`EngineStatus::Loading`] and return the settled value.
pub async fn wait_settled(status: &mut watch::Receiver<EngineStatus>) -> EngineStatus {
    match status.wait_for(EngineStatus::is_settled).await {
        Ok(settled) => settled.clone(),
        Err(_) => status.borrow().clone(),
    }
}

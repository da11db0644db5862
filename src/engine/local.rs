//! In-context engine backed by `mistralrs`.
//!
//! GGUF models are pulled from HuggingFace (cached after the first run) and
//! loaded onto the best available device. Completions are streamed through a
//! tokio channel so fragments reach the transcript as soon as they are
//! generated instead of after the whole reply is done.

use std::sync::Arc;

use async_trait::async_trait;
use mistralrs::{
    GgufModelBuilder, MemoryGpuConfig, Model, PagedAttentionMetaBuilder, RequestBuilder, Response,
    TextMessageRole, TextMessages,
};
use tokio::sync::{RwLock, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use super::{ChatEngine, EngineError, EngineFactory, Fragment, FragmentStream};
use crate::config::{AppConfig, ModelRecord, SamplingConfig};
use crate::transcript::{ChatTurn, Role};

/// Minimum allowed local context size.
const MIN_CONTEXT_SIZE_TOKENS: usize = 1024;

/// Capacity of the fragment channel between the generation task and the consumer.
const FRAGMENT_CHANNEL_CAPACITY: usize = 64;

/// The model currently serving completions.
struct LoadedModel {
    model_id: String,
    model: Arc<Model>,
}

/// Engine that runs `mistralrs` on the caller's runtime.
pub struct LocalEngine {
    config: AppConfig,
    loaded: RwLock<Option<LoadedModel>>,
}

impl LocalEngine {
    /// Create an engine for the models and sampling settings in `config`.
    ///
    /// No model is loaded until [`ChatEngine::reload`] is called.
    pub fn new(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            loaded: RwLock::new(None),
        }
    }

    /// Id of the loaded model, if any.
    pub async fn loaded_model_id(&self) -> Option<String> {
        self.loaded.read().await.as_ref().map(|m| m.model_id.clone())
    }

    fn model_record(&self, model_id: &str) -> Result<&ModelRecord, EngineError> {
        self.config
            .find_model(model_id)
            .ok_or_else(|| EngineError::ConfigError(format!("unknown model id `{model_id}`")))
    }

    async fn build_model(&self, record: &ModelRecord) -> Result<Arc<Model>, EngineError> {
        info!(
            "loading local model: {} ({} / {})",
            record.model_id, record.repo_id, record.gguf_file
        );

        let mut builder =
            GgufModelBuilder::new(&record.repo_id, vec![&record.gguf_file]).with_logging();
        if !record.tokenizer_id.is_empty() {
            builder = builder.with_tok_model_id(&record.tokenizer_id);
        }

        let context_size = effective_context_size_tokens(&self.config.sampling);
        debug!("local model context_size_tokens={context_size}");

        let model = builder
            .with_paged_attn(|| {
                PagedAttentionMetaBuilder::default()
                    .with_gpu_memory(MemoryGpuConfig::ContextSize(context_size))
                    .build()
            })
            .map_err(|e| EngineError::LoadError(format!("paged attention config failed: {e}")))?
            .build()
            .await
            .map_err(|e| EngineError::LoadError(format!("model build failed: {e}")))?;

        info!("local model {} loaded", record.model_id);
        Ok(Arc::new(model))
    }

    fn build_request(&self, turns: &[ChatTurn]) -> RequestBuilder {
        let mut messages = TextMessages::new().enable_thinking(false);
        for turn in turns {
            messages = messages.add_message(mistral_role(turn.role), &turn.content);
        }
        RequestBuilder::from(messages)
            .set_sampler_temperature(self.config.sampling.temperature)
            .set_sampler_topp(self.config.sampling.top_p)
            .set_sampler_max_len(self.config.sampling.max_tokens)
            .enable_thinking(false)
    }
}

impl std::fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEngine")
            .field("models", &self.config.models.len())
            .finish()
    }
}

#[async_trait]
impl ChatEngine for LocalEngine {
    fn name(&self) -> &str {
        "mistralrs"
    }

    async fn reload(&self, model_id: &str) -> Result<(), EngineError> {
        let record = self.model_record(model_id)?;

        let model = self.build_model(record).await?;
        let mut loaded = self.loaded.write().await;
        if let Some(previous) = loaded.as_ref() {
            debug!("replacing model {} with {model_id}", previous.model_id);
        }
        *loaded = Some(LoadedModel {
            model_id: model_id.to_owned(),
            model,
        });
        Ok(())
    }

    async fn stream_completion(&self, turns: &[ChatTurn]) -> Result<FragmentStream, EngineError> {
        let model = match self.loaded.read().await.as_ref() {
            Some(loaded) => Arc::clone(&loaded.model),
            None => return Err(EngineError::NotReady("no model loaded".to_owned())),
        };

        debug!("building mistralrs request with {} turns", turns.len());
        let request = self.build_request(turns);
        let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);

        // The mistralrs stream borrows the model, so both live inside the task.
        tokio::spawn(async move {
            forward_fragments(model, request, tx).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Drive one mistralrs stream, forwarding content deltas until it ends.
async fn forward_fragments(
    model: Arc<Model>,
    request: RequestBuilder,
    tx: mpsc::Sender<Result<Fragment, EngineError>>,
) {
    let mut stream = match model.stream_chat_request(request).await {
        Ok(s) => s,
        Err(e) => {
            let _ = tx
                .send(Err(EngineError::StreamError(format!(
                    "mistralrs stream failed: {e}"
                ))))
                .await;
            return;
        }
    };

    let mut fragment_count: usize = 0;
    while let Some(response) = stream.next().await {
        let failure = match response {
            Response::Chunk(chunk) => {
                let content = chunk
                    .choices
                    .first()
                    .and_then(|choice| choice.delta.content.clone())
                    .unwrap_or_default();
                if content.is_empty() {
                    continue;
                }
                fragment_count += 1;
                if tx.send(Ok(Fragment::new(content))).await.is_err() {
                    debug!("fragment consumer dropped, stopping generation forwarder");
                    return;
                }
                continue;
            }
            Response::Done(_) => break,
            Response::ModelError(msg, _) => format!("model error: {msg}"),
            Response::InternalError(e) => format!("internal error: {e}"),
            Response::ValidationError(e) => format!("validation error: {e}"),
            _ => continue,
        };
        warn!("mistralrs stream failed after {fragment_count} fragments: {failure}");
        let _ = tx.send(Err(EngineError::StreamError(failure))).await;
        return;
    }
    debug!("mistralrs stream finished with {fragment_count} fragments");
}

fn mistral_role(role: Role) -> TextMessageRole {
    match role {
        Role::System => TextMessageRole::System,
        Role::User => TextMessageRole::User,
        Role::Assistant => TextMessageRole::Assistant,
    }
}

pub(crate) fn effective_context_size_tokens(sampling: &SamplingConfig) -> usize {
    if sampling.context_size_tokens < MIN_CONTEXT_SIZE_TOKENS {
        warn!(
            "sampling.context_size_tokens={} too small, clamping to {}",
            sampling.context_size_tokens, MIN_CONTEXT_SIZE_TOKENS
        );
        return MIN_CONTEXT_SIZE_TOKENS;
    }
    sampling.context_size_tokens
}

/// Default [`EngineFactory`]: builds a [`LocalEngine`] from the app config.
#[derive(Debug, Clone)]
pub struct MistralrsFactory {
    config: AppConfig,
}

impl MistralrsFactory {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for MistralrsFactory {
    fn create(&self) -> Result<Box<dyn ChatEngine>, EngineError> {
        Ok(Box::new(LocalEngine::new(&self.config)))
    }
}

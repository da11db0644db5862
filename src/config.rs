//! Configuration types for the chat application.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{ChatError, Result};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Host the engine on a dedicated worker thread instead of the calling runtime.
    pub use_worker: bool,
    /// Optional system prompt placed at the top of every transcript.
    pub system_prompt: String,
    /// Assistant greeting shown before the first user turn. Empty disables it.
    pub greeting: String,
    /// Default tracing level for the `localchat` target.
    pub log_level: String,
    /// Candidate models. The first entry is loaded at startup.
    pub models: Vec<ModelRecord>,
    /// Sampling settings applied to every completion.
    pub sampling: SamplingConfig,
    /// Chat page server settings.
    pub ui: UiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            use_worker: false,
            system_prompt: String::new(),
            greeting: "My name is WebLLM, how can I help you?".to_owned(),
            log_level: "info".to_owned(),
            models: vec![ModelRecord::default()],
            sampling: SamplingConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

/// A model the engine can load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Identifier passed to `reload`.
    pub model_id: String,
    /// HuggingFace repo containing the GGUF file.
    pub repo_id: String,
    /// GGUF filename within the repo.
    pub gguf_file: String,
    /// HuggingFace repo for the tokenizer.
    /// Leave empty to use the tokenizer bundled with the GGUF repo.
    #[serde(default)]
    pub tokenizer_id: String,
}

impl Default for ModelRecord {
    fn default() -> Self {
        Self {
            model_id: "qwen3-4b-instruct".to_owned(),
            repo_id: "unsloth/Qwen3-4B-Instruct-2507-GGUF".to_owned(),
            gguf_file: "Qwen3-4B-Instruct-2507-Q4_K_M.gguf".to_owned(),
            // The GGUF repo ships no tokenizer; use the base model repo.
            tokenizer_id: "Qwen/Qwen3-4B-Instruct-2507".to_owned(),
        }
    }
}

/// Sampling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Sampling temperature (0.0 = greedy, higher = more random).
    pub temperature: f64,
    /// Top-p (nucleus) sampling threshold.
    pub top_p: f64,
    /// Maximum tokens to generate per response.
    pub max_tokens: usize,
    /// Context window for KV cache sizing (tokens).
    pub context_size_tokens: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 2048,
            context_size_tokens: 4096,
        }
    }
}

/// Chat page server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind (0 = auto-assign).
    pub port: u16,
    /// Page heading and `<title>`.
    pub title: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3000,
            title: "WebLLM: Serverless AI".to_owned(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ChatError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ChatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/localchat/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("localchat").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("localchat")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/localchat-config/config.toml")
        }
    }

    /// The model loaded at startup.
    pub fn default_model(&self) -> Option<&ModelRecord> {
        self.models.first()
    }

    /// Look up a model by its id.
    pub fn find_model(&self, model_id: &str) -> Option<&ModelRecord> {
        self.models.iter().find(|m| m.model_id == model_id)
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(ChatError::Config("models list is empty".to_owned()));
        }
        let mut seen = HashSet::new();
        for model in &self.models {
            if model.model_id.trim().is_empty() {
                return Err(ChatError::Config("model_id must not be empty".to_owned()));
            }
            if !seen.insert(model.model_id.as_str()) {
                return Err(ChatError::Config(format!(
                    "duplicate model_id `{}`",
                    model.model_id
                )));
            }
        }
        if !(0.0..=2.0).contains(&self.sampling.temperature) {
            return Err(ChatError::Config(format!(
                "sampling.temperature must be within 0.0..=2.0, got {}",
                self.sampling.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.sampling.top_p) {
            return Err(ChatError::Config(format!(
                "sampling.top_p must be within 0.0..=1.0, got {}",
                self.sampling.top_p
            )));
        }
        if self.sampling.max_tokens == 0 {
            return Err(ChatError::Config(
                "sampling.max_tokens must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

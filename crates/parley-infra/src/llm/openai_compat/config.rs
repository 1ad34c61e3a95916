//! Configuration for the OpenAI-compatible provider.
//!
//! Local model runners (Docker Model Runner, llama.cpp server, Ollama) speak
//! the OpenAI chat completions protocol and ignore the bearer key, so a
//! placeholder is sent when none is configured.

use secrecy::ExposeSecret;

use parley_types::config::ModelConfig;

/// Sent as the bearer token when no `MODEL_API_KEY` is set.
pub const PLACEHOLDER_API_KEY: &str = "not-needed";

/// Configuration for an OpenAI-compatible LLM provider.
///
/// Used to construct an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Human-readable provider name, reported in `gen_ai.system`.
    pub provider_name: String,
    /// Base URL for the API (e.g., "http://model-runner.docker.internal/engines/v1").
    pub base_url: String,
    /// API key for authentication.
    pub api_key: String,
    /// Model identifier used when a request leaves `model` empty.
    pub model: String,
}

impl OpenAiCompatConfig {
    pub fn from_model_config(config: &ModelConfig) -> Self {
        Self {
            provider_name: "openai_compatible".into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config
                .api_key
                .as_ref()
                .map(|key| key.expose_secret().to_string())
                .unwrap_or_else(|| PLACEHOLDER_API_KEY.to_string()),
            model: config.model_id.clone(),
        }
    }
}

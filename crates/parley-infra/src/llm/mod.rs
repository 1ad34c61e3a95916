//! LLM provider implementations.
//!
//! Contains the OpenAI-compatible implementation of the [`LlmProvider`]
//! trait defined in `parley-core`, plus a factory ([`create_provider`]) that
//! builds it from a [`ModelConfig`].
//!
//! [`LlmProvider`]: parley_core::llm::provider::LlmProvider

pub mod openai_compat;

use tracing::info;

use parley_core::llm::box_provider::BoxLlmProvider;
use parley_types::config::ModelConfig;

use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::OpenAiCompatConfig;

/// Create a [`BoxLlmProvider`] for the configured model endpoint.
pub fn create_provider(config: &ModelConfig) -> BoxLlmProvider {
    info!(
        base_url = %config.base_url,
        model = %config.model_id,
        "Using OpenAI-compatible model endpoint"
    );
    BoxLlmProvider::new(OpenAiCompatibleProvider::new(
        OpenAiCompatConfig::from_model_config(config),
    ))
}

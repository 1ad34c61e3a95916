//! Service configuration types for Parley.
//!
//! `ServiceConfig` mirrors the optional `parley.toml` file. Every field has a
//! default; secrets are never read from the file and only arrive through the
//! environment (see `parley_infra::config`).

use std::fmt;
use std::str::FromStr;

use secrecy::SecretString;
use serde::Deserialize;

/// Fixed session lifetime, reset on every append.
pub const SESSION_TTL_SECONDS: u64 = 60 * 60 * 24;

/// Default cap on retained messages per session (user + assistant turns).
pub const DEFAULT_MAX_MESSAGES: i64 = 20;

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful chatbot. Always answer in a concise manner. \
Use a friendly, conversational tone. Never sound robotic. Use provided context (if any) and past \
conversation history to answer questions. Do not hallucinate or make up information. If you don't \
know the answer, say you don't know.";

/// Top-level configuration for the Parley service.
#[derive(Debug, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// HTTP listener and client authentication.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret expected in the `X-API-KEY` header. Environment only.
    #[serde(skip)]
    pub api_key: Option<SecretString>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
        }
    }
}

/// Settings for the OpenAI-compatible generation endpoint.
#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_base_url")]
    pub base_url: String,

    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: Option<f64>,

    /// Bearer key for the model endpoint. Environment only; local model
    /// runners usually accept any value.
    #[serde(skip)]
    pub api_key: Option<SecretString>,
}

fn default_model_base_url() -> String {
    "http://model-runner.docker.internal/engines/v1".to_string()
}

fn default_model_id() -> String {
    "ai/qwen3:4B-UD-Q4_K_XL".to_string()
}

fn default_system_instruction() -> String {
    DEFAULT_SYSTEM_INSTRUCTION.to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            model_id: default_model_id(),
            system_instruction: default_system_instruction(),
            max_tokens: default_max_tokens(),
            temperature: None,
            api_key: None,
        }
    }
}

/// Which session store implementation backs the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    /// Process-local store; history is lost on restart.
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Redis => write!(f, "redis"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("invalid store backend: '{other}'")),
        }
    }
}

/// Session store connection and retention settings.
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Maximum retained messages per session. Values `<= 0` disable trimming
    /// entirely, letting history grow without bound (a misconfiguration).
    #[serde(default = "default_max_messages")]
    pub max_messages: i64,
}

fn default_redis_url() -> String {
    "redis://redis:6379".to_string()
}

fn default_max_messages() -> i64 {
    DEFAULT_MAX_MESSAGES
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
            max_messages: default_max_messages(),
        }
    }
}

impl StoreConfig {
    pub fn settings(&self) -> StoreSettings {
        StoreSettings {
            max_messages: self.max_messages,
            session_ttl_secs: SESSION_TTL_SECONDS,
        }
    }
}

/// Retention rules applied by every session store on append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    pub max_messages: i64,
    pub session_ttl_secs: u64,
}

impl StoreSettings {
    /// Whether appends trim the list (`max_messages > 0`).
    pub fn trims(&self) -> bool {
        self.max_messages > 0
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            session_ttl_secs: SESSION_TTL_SECONDS,
        }
    }
}

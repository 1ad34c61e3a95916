//! Service configuration loader for Parley.
//!
//! Reads an optional TOML file (from `--config` or `PARLEY_CONFIG`) into
//! [`ServiceConfig`], falling back to defaults when the file is missing or
//! malformed, then applies environment overrides on top. Secrets (`API_KEY`,
//! `MODEL_API_KEY`) come from the environment only.

use std::path::Path;
use std::str::FromStr;

use secrecy::SecretString;

use parley_types::config::{ServerConfig, ServiceConfig, StoreBackend};
use parley_types::error::ConfigError;

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_ENV: &str = "PARLEY_CONFIG";

/// Load configuration from `path` (or `PARLEY_CONFIG`) and the process
/// environment.
pub async fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let env_path = std::env::var(CONFIG_PATH_ENV).ok().filter(|p| !p.is_empty());
    let mut config = match path.or(env_path.as_deref().map(Path::new)) {
        Some(path) => load_config_file(path).await,
        None => ServiceConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Read a TOML config file.
///
/// - If the file does not exist, returns [`ServiceConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_config_file(path: &Path) -> ServiceConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file found at {}, using defaults", path.display());
            return ServiceConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return ServiceConfig::default();
        }
    };

    match toml::from_str::<ServiceConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            ServiceConfig::default()
        }
    }
}

/// Apply environment overrides using `lookup` (injected for tests).
///
/// Empty values count as unset.
pub fn apply_env_overrides(
    config: &mut ServiceConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(host) = get("HOST") {
        config.server.host = host;
    }
    if let Some(port) = get("PORT") {
        config.server.port = parse_var("PORT", &port)?;
    }
    if let Some(key) = get("API_KEY") {
        config.server.api_key = Some(SecretString::from(key));
    }

    if let Some(base_url) = get("MODEL_BASE_URL") {
        config.model.base_url = base_url;
    }
    if let Some(model_id) = get("MODEL_ID") {
        config.model.model_id = model_id;
    }
    if let Some(key) = get("MODEL_API_KEY") {
        config.model.api_key = Some(SecretString::from(key));
    }
    if let Some(instruction) = get("SYSTEM_INSTRUCTION") {
        config.model.system_instruction = instruction;
    }

    if let Some(backend) = get("STORE_BACKEND") {
        config.store.backend = StoreBackend::from_str(&backend).map_err(|message| {
            ConfigError::Invalid {
                key: "STORE_BACKEND".to_string(),
                message,
            }
        })?;
    }
    if let Some(url) = get("REDIS_URL") {
        config.store.redis_url = url;
    }
    if let Some(max) = get("MEMORY_MAX_MESSAGES") {
        config.store.max_messages = parse_var("MEMORY_MAX_MESSAGES", &max)?;
    }

    Ok(())
}

/// The client API key; the server refuses to start without one.
pub fn require_api_key(server: &ServerConfig) -> Result<&SecretString, ConfigError> {
    server
        .api_key
        .as_ref()
        .ok_or_else(|| ConfigError::Missing("API_KEY".to_string()))
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        message: format!("'{raw}': {e}"),
    })
}

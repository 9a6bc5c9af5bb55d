use std::path::Path;

use secrecy::SecretString;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::secrets::{has_secret_source, resolve_secret, resolve_secret_optional};

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks values serde cannot: ranges, URLs, and backoff ordering.
/// Collaborator settings may be empty; they are only required by the
/// commands that use them.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let queue = &config.queue;
    if queue.poll_interval_ms == 0 {
        return Err(invalid("queue.poll_interval_ms must be greater than 0"));
    }
    if queue.max_concurrent_jobs == 0 {
        return Err(invalid("queue.max_concurrent_jobs must be at least 1"));
    }
    if queue.backoff_base_ms > queue.backoff_cap_ms {
        return Err(invalid(format!(
            "queue.backoff_base_ms ({}) exceeds queue.backoff_cap_ms ({})",
            queue.backoff_base_ms, queue.backoff_cap_ms
        )));
    }

    if config.intake.cache_capacity == 0 {
        return Err(invalid("intake.cache_capacity must be at least 1"));
    }

    for (name, url) in [
        ("desk.base_url", config.desk.base_url.as_str()),
        ("extractor.endpoint", config.extractor.endpoint.as_str()),
    ] {
        if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid(format!("{} must be an http(s) URL", name)));
        }
    }

    if config.desk.timeout_secs == 0 || config.extractor.timeout_secs == 0 {
        return Err(invalid("HTTP timeouts must be greater than 0"));
    }

    if config.logging.level.trim().is_empty() {
        return Err(invalid("logging.level must not be empty"));
    }

    Ok(())
}

/// Resolves the support-desk API key.
pub fn desk_api_key(config: &Config) -> Result<SecretString, ConfigError> {
    let desk = &config.desk;
    resolve_secret(
        desk.api_key.as_deref(),
        desk.api_key_file.as_deref(),
        desk.api_key_env.as_deref(),
    )
    .map_err(|source| ConfigError::Secret {
        name: "desk.api_key".to_string(),
        source,
    })
}

/// Resolves the webhook signing secret; `None` when signatures are not checked.
pub fn webhook_secret(config: &Config) -> Result<Option<SecretString>, ConfigError> {
    let intake = &config.intake;
    let sources = (
        intake.webhook_secret.as_deref(),
        intake.webhook_secret_file.as_deref(),
        intake.webhook_secret_env.as_deref(),
    );
    if !has_secret_source(sources.0, sources.1, sources.2) {
        return Ok(None);
    }
    resolve_secret_optional(sources.0, sources.1, sources.2).map_err(|source| ConfigError::Secret {
        name: "intake.webhook_secret".to_string(),
        source,
    })
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

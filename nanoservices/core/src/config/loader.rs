use std::path::Path;
use std::time::Duration;

use crate::config::types::EngineConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid duration '{0}': expected a number followed by ms, s, m or h")]
    Duration(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Load and validate an engine config from a YAML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate an engine config from a YAML string.
pub fn parse_config(yaml: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = serde_yaml::from_str(yaml)?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.workers == 0 {
        return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
    }
    if config.source.pool_size == 0 || config.warehouse.pool_size == 0 {
        return Err(ConfigError::Invalid("pool_size must be at least 1".to_string()));
    }
    if config.object_store.bucket.is_empty() || config.object_store.bucket.contains('/') {
        return Err(ConfigError::Invalid(format!(
            "bucket '{}' must be a single non-empty path segment",
            config.object_store.bucket
        )));
    }
    parse_duration(&config.source.busy_timeout)?;
    parse_duration(&config.warehouse.busy_timeout)?;
    if let Some(timeout) = &config.source.query_timeout {
        parse_duration(timeout)?;
    }
    Ok(())
}

/// Parse `"250ms"`, `"5s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits.parse().map_err(|_| ConfigError::Duration(s.to_string()))?;
    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(ConfigError::Duration(s.to_string())),
    }
}

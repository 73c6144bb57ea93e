//! Configuration loading from disk and the environment.

use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::ValidationError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for environment variable {var}")]
    EnvVar { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from a TOML file. Validation runs separately, after
/// environment overrides have been applied.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: ServiceConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Apply environment-variable overrides on top of the loaded configuration.
///
/// Recognized variables: `MAX_FILE_SIZE` (bytes), `REQUEST_LIMIT` (count),
/// `TIME_WINDOW` (seconds), `BIND_ADDRESS`. A variable that is set but
/// unparseable is a hard error rather than a silent fallback.
pub fn apply_env_overrides(config: &mut ServiceConfig) -> Result<(), ConfigError> {
    if let Some(value) = env_parse::<usize>("MAX_FILE_SIZE")? {
        config.upload.max_file_size = value;
    }
    if let Some(value) = env_parse::<u32>("REQUEST_LIMIT")? {
        config.rate_limit.max_requests = value;
    }
    if let Some(value) = env_parse::<u64>("TIME_WINDOW")? {
        config.rate_limit.window_secs = value;
    }
    if let Ok(value) = std::env::var("BIND_ADDRESS") {
        config.listener.bind_address = value;
    }
    Ok(())
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(ConfigError::EnvVar { var, value: raw }),
        },
        Err(_) => Ok(None),
    }
}

use super::types::Config;
use crate::config::{env_var_regex, expand_env_vars, expand_tilde};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;
    parse_config(&yaml)
}

/// Parse config text: expand `$env{..}`, deserialize, expand `~`, validate.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml)?;

    let mut config: Config = serde_yaml::from_str(&yaml)?;
    if let Some(path) = config.monitor.log_path.as_mut() {
        *path = expand_tilde(path);
    }

    validate_config(&config)?;
    Ok(config)
}

fn check_unexpanded_vars(yaml: &str) -> Result<(), ConfigError> {
    let mut missing: Vec<&str> = env_var_regex()
        .captures_iter(yaml)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    missing.sort_unstable();
    missing.dedup();
    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}",
        missing.join(", ")
    )))
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let monitor = &config.monitor;
    let mut errors = Vec::new();

    if monitor.poll_interval.is_zero() {
        errors.push("monitor.poll_interval must be greater than zero".to_string());
    }
    if monitor.timeout_polls == 0 {
        errors.push("monitor.timeout_polls must be greater than zero".to_string());
    }
    if let Some(path) = &monitor.log_path {
        if path.as_os_str().is_empty() {
            errors.push("monitor.log_path must not be empty".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

use std::path::Path;

use secrecy::SecretString;

use crate::config::schema::{AnalysisConfig, Config};
use crate::error::ConfigError;
use crate::secrets::resolve_secret;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Environment variables that override file values, applied after validation.
pub const ENV_DATA_DIR: &str = "CLAIMSLION_DATA_DIR";
pub const ENV_LISTEN_ADDR: &str = "CLAIMSLION_LISTEN_ADDR";
pub const ENV_MODEL: &str = "CLAIMSLION_MODEL";
pub const ENV_MAX_UPLOAD_BYTES: &str = "CLAIMSLION_MAX_UPLOAD_BYTES";
pub const ENV_API_BASE_URL: &str = "CLAIMSLION_API_BASE_URL";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Loads the file when one is given, otherwise starts from defaults, then
/// applies environment overrides and re-validates.
pub fn load_config_with_env(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    apply_env_overrides(&mut config)?;
    validate_config(&config)?;

    Ok(config)
}

pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    if let Some(value) = env_value(ENV_DATA_DIR) {
        config.data_directory = value;
    }
    if let Some(value) = env_value(ENV_LISTEN_ADDR) {
        config.server.listen_addr = value;
    }
    if let Some(value) = env_value(ENV_MODEL) {
        config.analysis.model = value;
    }
    if let Some(value) = env_value(ENV_API_BASE_URL) {
        config.analysis.api_base_url = value;
    }
    if let Some(value) = env_value(ENV_MAX_UPLOAD_BYTES) {
        config.intake.max_upload_bytes =
            value
                .parse()
                .map_err(|_| ConfigError::InvalidEnvOverride {
                    name: ENV_MAX_UPLOAD_BYTES.to_string(),
                    value,
                })?;
    }
    Ok(())
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolves the model API key: direct value, then file, then env var.
pub fn resolve_api_key(analysis: &AnalysisConfig) -> Result<SecretString, ConfigError> {
    Ok(resolve_secret(
        analysis.api_key.as_deref(),
        analysis.api_key_file.as_deref(),
        analysis.api_key_env_var.as_deref(),
    )?)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.intake.max_upload_bytes == 0 {
        return Err(ConfigError::Validation {
            message: "intake.max_upload_bytes must be greater than 0".to_string(),
        });
    }

    if config.intake.allowed_extensions.is_empty() {
        return Err(ConfigError::Validation {
            message: "intake.allowed_extensions must not be empty".to_string(),
        });
    }

    for ext in &config.intake.allowed_extensions {
        if ext.is_empty() || ext.starts_with('.') || !ext.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::Validation {
                message: format!("Invalid extension '{}': use bare names like \"csv\"", ext),
            });
        }
    }

    if config.analysis.max_rows == 0 {
        return Err(ConfigError::Validation {
            message: "analysis.max_rows must be greater than 0".to_string(),
        });
    }

    if config.analysis.max_expanded_bytes < config.intake.max_upload_bytes {
        return Err(ConfigError::Validation {
            message: "analysis.max_expanded_bytes must not be smaller than intake.max_upload_bytes"
                .to_string(),
        });
    }

    if config.analysis.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "analysis.max_attempts must be at least 1".to_string(),
        });
    }

    if !(0.0..=1.0).contains(&config.analysis.temperature)
        || !(0.0..=1.0).contains(&config.chat.temperature)
    {
        return Err(ConfigError::Validation {
            message: "temperature must be between 0.0 and 1.0".to_string(),
        });
    }

    if config.worker.max_in_flight == 0 {
        return Err(ConfigError::Validation {
            message: "worker.max_in_flight must be greater than 0".to_string(),
        });
    }

    if config.status.default_wait_secs > config.status.wait_ceiling_secs {
        return Err(ConfigError::Validation {
            message: "status.default_wait_secs may not exceed status.wait_ceiling_secs"
                .to_string(),
        });
    }

    if config.chat.max_history_messages == 0 {
        return Err(ConfigError::Validation {
            message: "chat.max_history_messages must be greater than 0".to_string(),
        });
    }

    Ok(())
}

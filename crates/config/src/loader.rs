//! Configuration loader implementation

use crate::schema::Config;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use std::path::Path;
use types::ConfigError;

/// Configuration loader that handles YAML files and environment variables
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Config> {
        let config_path = config_path.as_ref();

        if !config_path.exists() {
            return Err(ConfigError::FileNotFound {
                path: config_path.display().to_string(),
            }
            .into());
        }

        let config: Config = Figment::new()
            .merge(Yaml::file(config_path))
            // PAYLIS_RELAYER__ACCESS_TOKEN -> relayer.access_token
            .merge(Env::prefixed("PAYLIS_").split("__"))
            .merge(
                Env::raw()
                    .only(&["DATABASE_URL"])
                    .map(|_| "database.url".into()),
            )
            .extract()
            .context("Failed to parse configuration")?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Load configuration from string (for testing)
    pub fn load_from_str(yaml_content: &str) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Yaml::string(yaml_content))
            .extract()
            .context("Failed to parse configuration from string")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Checks that must pass before the gateway starts
    fn validate(config: &Config) -> Result<()> {
        if config.network.chain_id == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.chain_id".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        let relayer = &config.relayer;
        if !relayer.base_url.starts_with("http://") && !relayer.base_url.starts_with("https://")
        {
            return Err(ConfigError::ValidationError {
                field: "relayer.base_url".to_string(),
                message: format!("Invalid relayer URL: {}", relayer.base_url),
            }
            .into());
        }

        if relayer.relayer_id.is_empty() {
            return Err(ConfigError::MissingField {
                field: "relayer.relayer_id".to_string(),
            }
            .into());
        }

        if relayer.access_token.is_empty() {
            return Err(ConfigError::MissingField {
                field: "relayer.access_token".to_string(),
            }
            .into());
        }

        // Inbound webhooks are rejected without it
        if relayer.webhook_signing_key.is_empty() {
            return Err(ConfigError::MissingField {
                field: "relayer.webhook_signing_key".to_string(),
            }
            .into());
        }

        if relayer.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError {
                field: "relayer.timeout_seconds".to_string(),
                message: "Timeout must be greater than 0".to_string(),
            }
            .into());
        }

        if relayer.poll_attempts == 0 || relayer.poll_attempts > 10 {
            return Err(ConfigError::ValidationError {
                field: "relayer.poll_attempts".to_string(),
                message: format!("Poll attempts must be in 1..=10, got {}", relayer.poll_attempts),
            }
            .into());
        }

        if relayer.gas_limit == 0 {
            return Err(ConfigError::ValidationError {
                field: "relayer.gas_limit".to_string(),
                message: "Gas limit cannot be 0".to_string(),
            }
            .into());
        }

        if config.tokens.is_empty() {
            return Err(ConfigError::ValidationError {
                field: "tokens".to_string(),
                message: "At least one token must be configured".to_string(),
            }
            .into());
        }

        let schedule = config.to_fee_schedule().map_err(|e| ConfigError::ValidationError {
            field: "fees".to_string(),
            message: e,
        })?;

        if schedule.tokens().count() != config.tokens.len() {
            return Err(ConfigError::ValidationError {
                field: "tokens".to_string(),
                message: "Duplicate token address".to_string(),
            }
            .into());
        }

        for token in &config.tokens {
            if token.percentage_bps > 10_000 {
                return Err(ConfigError::ValidationError {
                    field: "tokens.percentage_bps".to_string(),
                    message: format!("Percentage fee above 100% for token {}", token.symbol),
                }
                .into());
            }
        }

        if config.token(&config.checkout.default_token).is_none() {
            return Err(ConfigError::ValidationError {
                field: "checkout.default_token".to_string(),
                message: format!(
                    "Default token {} is not in the token list",
                    config.checkout.default_token
                ),
            }
            .into());
        }

        if !config.notifier.callback_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "notifier.callback_path".to_string(),
                value: config.notifier.callback_path.clone(),
            }
            .into());
        }

        if config.server.port == 0 {
            return Err(ConfigError::ValidationError {
                field: "server.port".to_string(),
                message: "Server port cannot be 0".to_string(),
            }
            .into());
        }

        if config.database.url.is_empty() {
            return Err(ConfigError::ValidationError {
                field: "database.url".to_string(),
                message: "Database URL cannot be empty".to_string(),
            }
            .into());
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::ValidationError {
                field: "database.max_connections".to_string(),
                message: "Max connections cannot be 0".to_string(),
            }
            .into());
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logging.level".to_string(),
                message: format!(
                    "Invalid log level: {}. Valid levels: {:?}",
                    config.logging.level, valid_log_levels
                ),
            }
            .into());
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logging.format".to_string(),
                message: format!(
                    "Invalid log format: {}. Valid formats: {:?}",
                    config.logging.format, valid_log_formats
                ),
            }
            .into());
        }

        Ok(())
    }

    /// Get default configuration
    pub fn default() -> Config {
        Config::default()
    }

    /// Create example configuration file
    pub fn create_example<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Self::default();
        let yaml_content = serde_yaml::to_string(&config)
            .context("Failed to serialize default configuration")?;

        std::fs::write(path.as_ref(), yaml_content)
            .context("Failed to write example configuration file")?;

        Ok(())
    }
}

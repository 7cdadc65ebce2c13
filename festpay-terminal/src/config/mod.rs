//! Configuration module for festpay-terminal.
//!
//! Handles loading configuration from the TOML file and CLI/environment
//! overrides, and turns it into the runtime types used by `festpay-core`.

pub mod file;

use crate::config::file::FileConfig;
use bytes::Bytes;
use festpay_core::card::CardSettings;
use festpay_core::config::TerminalConfig;
use festpay_core::processors::ReplayPolicy;
use festpay_sdk::client::ClientTimeouts;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Backend connection settings.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: Url,
    pub key_id: String,
    pub secret: Vec<u8>,
    pub timeouts: ClientTimeouts,
}

/// Loaded and validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub backend: BackendSettings,
    pub database_path: PathBuf,
    pub replay: ReplayPolicy,
    pub content_marker: Bytes,
    pub card: CardSettings,
    pub terminal: Option<TerminalConfig>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    secret_override: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader.
    ///
    /// `secret_override` replaces `backend.terminal_secret`, so the secret can
    /// come from the environment instead of the file.
    pub fn new(config_path: impl AsRef<Path>, secret_override: Option<String>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            secret_override,
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Read, validate and convert the config file.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(secret) = &self.secret_override {
            file_config.backend.terminal_secret = secret.clone();
        }

        validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.backend.terminal_secret.is_empty() {
        return Err(ConfigError::ValidationError(
            "backend.terminal_secret must not be empty".to_string(),
        ));
    }
    if config.backend.key_id.is_empty() {
        return Err(ConfigError::ValidationError(
            "backend.key_id must not be empty".to_string(),
        ));
    }
    if config.queue.passes == 0 {
        return Err(ConfigError::ValidationError(
            "queue.passes must be at least 1".to_string(),
        ));
    }
    if config.queue.idle_reactivation_secs == Some(0) {
        return Err(ConfigError::ValidationError(
            "queue.idle_reactivation_secs must be positive when set".to_string(),
        ));
    }
    if config.tags.content_marker.is_empty() {
        return Err(ConfigError::ValidationError(
            "tags.content_marker must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let FileConfig {
        backend,
        queue,
        tags,
        card,
        terminal,
    } = file_config;

    LoadedConfig {
        backend: BackendSettings {
            base_url: backend.base_url,
            key_id: backend.key_id,
            secret: backend.terminal_secret.into_bytes(),
            timeouts: ClientTimeouts {
                connect: Duration::from_secs(backend.connect_timeout_secs),
                request: Duration::from_secs(backend.request_timeout_secs),
            },
        },
        database_path: queue.database_path,
        replay: ReplayPolicy {
            passes: queue.passes,
            pass_delay: Duration::from_millis(queue.pass_delay_ms),
            business_rejections: queue.business_rejections,
            idle_reactivation: queue.idle_reactivation_secs.map(Duration::from_secs),
        },
        content_marker: Bytes::from(tags.content_marker.into_bytes()),
        card: CardSettings {
            currency: card.currency,
            merchant_label: card.merchant_label,
        },
        terminal: terminal.map(|t| TerminalConfig {
            merchant_id: t.merchant_id.into(),
            terminal_id: t.terminal_id.into(),
            cash_register_id: t.cash_register_id.map(Into::into),
        }),
    }
}

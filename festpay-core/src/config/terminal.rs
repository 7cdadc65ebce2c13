//! Access to the terminal registration (merchant and terminal ids).

use std::sync::Arc;

use async_trait::async_trait;
use festpay_sdk::client::BookingClient;

use super::ConfigStore;

pub use festpay_sdk::objects::TerminalConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigUnavailable {
    #[error("terminal config not present")]
    NotConfigured,
    #[error("terminal config could not be fetched: {0}")]
    Unreachable(String),
}

/// Source of the terminal registration needed before a card checkout.
#[async_trait]
pub trait TerminalConfigProvider: Send + Sync {
    async fn fetch_config(&self) -> Result<TerminalConfig, ConfigUnavailable>;
}

/// A locally held registration, e.g. loaded from the config file or cached
/// from an earlier backend fetch.
#[async_trait]
impl TerminalConfigProvider for ConfigStore<Option<TerminalConfig>> {
    async fn fetch_config(&self) -> Result<TerminalConfig, ConfigUnavailable> {
        self.snapshot().ok_or(ConfigUnavailable::NotConfigured)
    }
}

#[async_trait]
impl TerminalConfigProvider for BookingClient {
    async fn fetch_config(&self) -> Result<TerminalConfig, ConfigUnavailable> {
        match self.fetch_terminal_config().await {
            Ok(Some(config)) => Ok(config),
            Ok(None) => Err(ConfigUnavailable::NotConfigured),
            Err(e) => Err(ConfigUnavailable::Unreachable(e.to_string())),
        }
    }
}

/// Prefer the local registration and fall back to the backend, caching what
/// the backend returns.
pub struct CachedTerminalConfig {
    local: ConfigStore<Option<TerminalConfig>>,
    remote: Arc<dyn TerminalConfigProvider>,
}

impl CachedTerminalConfig {
    pub fn new(
        local: ConfigStore<Option<TerminalConfig>>,
        remote: Arc<dyn TerminalConfigProvider>,
    ) -> Self {
        Self { local, remote }
    }
}

#[async_trait]
impl TerminalConfigProvider for CachedTerminalConfig {
    async fn fetch_config(&self) -> Result<TerminalConfig, ConfigUnavailable> {
        if let Ok(config) = self.local.fetch_config().await {
            return Ok(config);
        }
        let config = self.remote.fetch_config().await?;
        tracing::info!(
            terminal_id = %config.terminal_id,
            merchant_id = %config.merchant_id,
            "Fetched terminal registration from backend"
        );
        self.local.update(Some(config.clone()));
        Ok(config)
    }
}

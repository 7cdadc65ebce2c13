//! TOML file configuration structures.
//!
//! These structs directly map to the `festpay-terminal.toml` file format.

use festpay_core::processors::RejectionPolicy;
use serde::Deserialize;
use std::path::PathBuf;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub tags: TagsConfig,
    #[serde(default)]
    pub card: CardConfig,
    /// Static registration. When absent it is fetched from the backend.
    #[serde(default)]
    pub terminal: Option<TerminalConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: Url,
    /// Identifier of the terminal key, sent with every request.
    pub key_id: String,
    /// HMAC-SHA256 request signing key.
    #[serde(default)]
    pub terminal_secret: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    3
}

fn default_request_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_passes")]
    pub passes: u32,
    #[serde(default = "default_pass_delay_ms")]
    pub pass_delay_ms: u64,
    #[serde(default)]
    pub business_rejections: RejectionPolicy,
    #[serde(default)]
    pub idle_reactivation_secs: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            passes: default_passes(),
            pass_delay_ms: default_pass_delay_ms(),
            business_rejections: RejectionPolicy::default(),
            idle_reactivation_secs: None,
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./festpay-queue.sqlite")
}

fn default_passes() -> u32 {
    3
}

fn default_pass_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagsConfig {
    #[serde(default = "default_content_marker")]
    pub content_marker: String,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            content_marker: default_content_marker(),
        }
    }
}

fn default_content_marker() -> String {
    String::from_utf8_lossy(festpay_core::tags::DEFAULT_CONTENT_MARKER).into_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardConfig {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_merchant_label")]
    pub merchant_label: String,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            merchant_label: default_merchant_label(),
        }
    }
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_merchant_label() -> String {
    "festpay".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalConfig {
    pub merchant_id: String,
    pub terminal_id: String,
    #[serde(default)]
    pub cash_register_id: Option<String>,
}

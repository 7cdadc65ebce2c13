//! Long-lived terminal components shared by the subcommands and the device
//! app.

use crate::config::LoadedConfig;
use bytes::Bytes;
use festpay_core::card::{CallbackRouter, CardPaymentGateway, CardSdk, CardSettings};
use festpay_core::config::{CachedTerminalConfig, ConfigStore, TerminalConfig};
use festpay_core::events::BookingEventSender;
use festpay_core::orchestrator::{OrchestratorSettings, PaymentOrchestrator};
use festpay_core::processors::ReplayPolicy;
use festpay_core::queue::{DurableRequestQueue, SqliteRequestStore};
use festpay_core::tags::{ScanOptions, ScanSession, TagReader, TagValidator};
use festpay_sdk::client::BookingClient;
use std::sync::Arc;

/// Everything opened from a [`LoadedConfig`].
///
/// Config values that SIGHUP may replace live in [`ConfigStore`]s. The tag
/// marker and card settings are fixed for the lifetime of the state.
#[derive(Clone)]
pub struct TerminalState {
    pub store: Arc<SqliteRequestStore>,
    pub queue: DurableRequestQueue,
    pub client: BookingClient,
    pub replay_policy: ConfigStore<ReplayPolicy>,
    pub terminal_config: ConfigStore<Option<TerminalConfig>>,
    content_marker: Bytes,
    card: CardSettings,
}

impl TerminalState {
    pub async fn open(config: &LoadedConfig) -> anyhow::Result<Self> {
        let store = Arc::new(SqliteRequestStore::open(&config.database_path).await?);
        let queue = DurableRequestQueue::new(store.clone());
        let client = BookingClient::new(
            config.backend.base_url.clone(),
            config.backend.key_id.clone(),
            config.backend.secret.clone(),
            config.backend.timeouts,
        )?;
        Ok(Self {
            store,
            queue,
            client,
            replay_policy: ConfigStore::new(config.replay.clone()),
            terminal_config: ConfigStore::new(config.terminal.clone()),
            content_marker: config.content_marker.clone(),
            card: config.card.clone(),
        })
    }

    /// Terminal registration, from the config file or else from the backend.
    pub fn terminal_config_provider(&self) -> CachedTerminalConfig {
        CachedTerminalConfig::new(
            self.terminal_config.clone(),
            Arc::new(self.client.clone()),
        )
    }

    /// Validator for the terminal's tag reader, checking the configured
    /// content marker.
    pub fn tag_validator(&self, reader: Arc<dyn TagReader>) -> TagValidator {
        TagValidator::new(reader).with_marker(self.content_marker.clone())
    }

    pub fn scan_session(&self, reader: Arc<dyn TagReader>, options: ScanOptions) -> ScanSession {
        ScanSession::new(Arc::new(self.tag_validator(reader)), options)
    }

    /// Card gateway charging in the configured currency.
    ///
    /// `callbacks` must be the router the SDK delivers its results to.
    pub fn card_gateway(&self, sdk: Arc<dyn CardSdk>, callbacks: CallbackRouter) -> CardPaymentGateway {
        CardPaymentGateway::new(
            Arc::new(self.terminal_config_provider()),
            sdk,
            callbacks,
            self.card.clone(),
        )
    }

    /// Payment flow on top of this state's queue.
    ///
    /// `events` must be the sender of the running replay processor.
    pub fn orchestrator(
        &self,
        reader: Arc<dyn TagReader>,
        sdk: Arc<dyn CardSdk>,
        callbacks: CallbackRouter,
        events: BookingEventSender,
        settings: OrchestratorSettings,
    ) -> PaymentOrchestrator {
        PaymentOrchestrator::new(
            self.scan_session(reader, ScanOptions::default()),
            Arc::new(self.card_gateway(sdk, callbacks)),
            self.queue.clone(),
            events,
            settings,
        )
    }

    /// Apply a reloaded config to the swappable parts.
    pub fn apply_reload(&self, config: &LoadedConfig) {
        self.replay_policy.update(config.replay.clone());
        if config.terminal.is_some() {
            self.terminal_config.update(config.terminal.clone());
        }
        if config.content_marker != self.content_marker || config.card != self.card {
            tracing::warn!("Tag and card settings changed, restart the terminal to apply them");
        }
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendSettings;
    use async_trait::async_trait;
    use festpay_core::card::{ActivityCode, ActivityResult, CallbackChannel, Checkout, CheckoutPayload, SdkError};
    use festpay_core::events::booking_event_channel;
    use festpay_core::orchestrator::BookingOutcome;
    use festpay_core::tags::{RawTag, ScanOutcome, TagReadError};
    use festpay_sdk::client::ClientTimeouts;
    use rust_decimal::Decimal;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Presents the queued tags in order, then waits forever.
    struct QueuedReader(Mutex<VecDeque<RawTag>>);

    impl QueuedReader {
        fn new(contents: &[&'static [u8]]) -> Arc<Self> {
            let tags = contents
                .iter()
                .enumerate()
                .map(|(i, content)| RawTag {
                    uid: 0x1000 + i as u64,
                    content: Bytes::from_static(content),
                })
                .collect();
            Arc::new(Self(Mutex::new(tags)))
        }
    }

    #[async_trait]
    impl TagReader for QueuedReader {
        async fn read(&self) -> Result<RawTag, TagReadError> {
            let next = self.0.lock().unwrap().pop_front();
            match next {
                Some(tag) => Ok(tag),
                None => std::future::pending().await,
            }
        }
    }

    /// Logged-in card SDK approving every checkout.
    struct ApprovingSdk {
        router: CallbackRouter,
        checkouts: Mutex<Vec<Checkout>>,
    }

    impl CardSdk for ApprovingSdk {
        fn is_logged_in(&self) -> bool {
            true
        }

        fn launch_login(&self, _channel: CallbackChannel) -> Result<(), SdkError> {
            Ok(())
        }

        fn launch_checkout(&self, checkout: &Checkout, channel: CallbackChannel) -> Result<(), SdkError> {
            self.checkouts.lock().unwrap().push(checkout.clone());
            self.router.deliver(
                channel.code(),
                ActivityResult {
                    code: ActivityCode::Ok,
                    payload: Some(CheckoutPayload {
                        result_code: CheckoutPayload::SUCCESS,
                        token: Some("txn-7".to_string()),
                        message: None,
                    }),
                },
            );
            Ok(())
        }

        fn launch_settings(&self, _channel: CallbackChannel) -> Result<(), SdkError> {
            Ok(())
        }
    }

    fn loaded_config(dir: &tempfile::TempDir) -> LoadedConfig {
        LoadedConfig {
            backend: BackendSettings {
                base_url: "http://127.0.0.1:9/".parse().unwrap(),
                key_id: "bar-3".to_string(),
                secret: b"s3cret".to_vec(),
                timeouts: ClientTimeouts {
                    connect: Duration::from_millis(100),
                    request: Duration::from_millis(200),
                },
            },
            database_path: dir.path().join("queue.sqlite"),
            replay: ReplayPolicy::default(),
            content_marker: Bytes::from_static(b"summer-fest"),
            card: CardSettings {
                currency: "CHF".to_string(),
                merchant_label: "Main Bar".to_string(),
            },
            terminal: Some(TerminalConfig {
                merchant_id: "m-1".into(),
                terminal_id: "bar-3".into(),
                cash_register_id: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_validator_checks_configured_marker() {
        let dir = tempfile::tempdir().unwrap();
        let state = TerminalState::open(&loaded_config(&dir)).await.unwrap();
        let validator = state.tag_validator(QueuedReader::new(&[b"summer-fest\x2a", b"festpay-tag-v1"]));

        assert!(matches!(validator.scan().await, ScanOutcome::Success(tag) if tag.uid() == 0x1000));
        assert_eq!(validator.scan().await, ScanOutcome::Tampered);
        state.close().await;
    }

    #[tokio::test]
    async fn test_card_payment_uses_configured_settings() {
        let dir = tempfile::tempdir().unwrap();
        let state = TerminalState::open(&loaded_config(&dir)).await.unwrap();
        let router = CallbackRouter::default();
        let sdk = Arc::new(ApprovingSdk {
            router: router.clone(),
            checkouts: Mutex::new(Vec::new()),
        });
        let (events, _) = booking_event_channel();
        let orchestrator = state.orchestrator(
            QueuedReader::new(&[b"summer-fest"]),
            sdk.clone(),
            router,
            events,
            OrchestratorSettings {
                confirmation_timeout: Duration::from_millis(50),
            },
        );

        let tag = orchestrator.scan_tag().await.unwrap();
        let receipt = orchestrator
            .pay_with_card(tag, Decimal::new(1250, 2), Decimal::ZERO)
            .await
            .unwrap();

        assert_eq!(receipt.outcome, BookingOutcome::Queued);
        assert_eq!(receipt.card_token.as_deref(), Some("txn-7"));
        let checkouts = sdk.checkouts.lock().unwrap().clone();
        assert_eq!(checkouts.len(), 1);
        assert_eq!(checkouts[0].currency, "CHF");
        assert_eq!(checkouts[0].title, "Main Bar - bar-3");
        assert!(state.queue.get(receipt.request.id()).await.unwrap().is_some());
        state.close().await;
    }
}

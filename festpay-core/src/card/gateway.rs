//! Card checkout through the vendor SDK.
//!
//! The gateway performs exactly one checkout per [`pay`](CardPaymentGateway::pay)
//! call and never retries on its own. Retrying is a cashier decision and goes
//! through the orchestrator with the same request, so the card processor sees
//! the same foreign transaction id.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::{info, warn};
use uuid::Uuid;

use super::callbacks::CallbackRouter;
use super::sdk::{ActivityCode, ActivityResult, CallbackChannel, CardSdk, Checkout, SdkError};
use crate::config::{TerminalConfig, TerminalConfigProvider};
use crate::entities::PaymentRequest;

pub const TERMINAL_CONFIG_MISSING: &str = "terminal config not present";
pub const PAYMENT_IN_PROGRESS: &str = "card payment already in progress";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CardPaymentState {
    #[default]
    None,
    /// The checkout screen was launched for this request.
    Started(Uuid),
    /// The card was charged. Carries the processor's transaction token.
    Success(String),
    /// The checkout ran and was declined or canceled.
    Failed(String),
    /// The checkout could not run or its result was unusable.
    Error(String),
}

impl CardPaymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CardPaymentState::Success(_) | CardPaymentState::Failed(_) | CardPaymentState::Error(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSettings {
    pub currency: String,
    /// Shown in front of the terminal id in the checkout title.
    pub merchant_label: String,
}

impl Default for CardSettings {
    fn default() -> Self {
        Self {
            currency: "EUR".to_string(),
            merchant_label: "festpay".to_string(),
        }
    }
}

pub struct CardPaymentGateway {
    config: Arc<dyn TerminalConfigProvider>,
    sdk: Arc<dyn CardSdk>,
    callbacks: CallbackRouter,
    settings: CardSettings,
    state_tx: watch::Sender<CardPaymentState>,
    in_flight: Mutex<()>,
}

impl CardPaymentGateway {
    /// `callbacks` must be the router the SDK delivers its results to.
    pub fn new(
        config: Arc<dyn TerminalConfigProvider>,
        sdk: Arc<dyn CardSdk>,
        callbacks: CallbackRouter,
        settings: CardSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(CardPaymentState::None);
        Self {
            config,
            sdk,
            callbacks,
            settings,
            state_tx,
            in_flight: Mutex::new(()),
        }
    }

    pub fn state(&self) -> watch::Receiver<CardPaymentState> {
        self.state_tx.subscribe()
    }

    pub fn state_stream(&self) -> WatchStream<CardPaymentState> {
        WatchStream::new(self.state_tx.subscribe())
    }

    /// Go back to `None` once the UI has shown a terminal state.
    ///
    /// Does nothing while a checkout is running.
    pub fn reset(&self) {
        if self.in_flight.try_lock().is_ok() {
            self.state_tx.send_replace(CardPaymentState::None);
        }
    }

    /// Charge the request total to a card. Returns the terminal state, which
    /// is also published on [`state`](Self::state).
    pub async fn pay(&self, request: &PaymentRequest) -> CardPaymentState {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!(request_id = %request.id(), "Card payment rejected, another one is running");
            return CardPaymentState::Error(PAYMENT_IN_PROGRESS.to_string());
        };
        self.state_tx.send_replace(CardPaymentState::None);

        let outcome = self.run_checkout(request).await;
        match &outcome {
            CardPaymentState::Success(_) => {
                info!(request_id = %request.id(), total = %request.total(), "Card payment succeeded")
            }
            other => warn!(request_id = %request.id(), state = ?other, "Card payment did not succeed"),
        }
        self.state_tx.send_replace(outcome.clone());
        outcome
    }

    /// Open the card reader settings screen and wait until it is closed.
    pub async fn open_settings(&self) -> Result<(), SdkError> {
        let result = self.launch_and_wait(CallbackChannel::Settings, |sdk, channel| {
            sdk.launch_settings(channel)
        });
        match result.await? {
            ActivityResult {
                code: ActivityCode::Ok | ActivityCode::Canceled,
                ..
            } => Ok(()),
            ActivityResult { code, .. } => Err(SdkError::Result(code)),
        }
    }

    async fn run_checkout(&self, request: &PaymentRequest) -> CardPaymentState {
        let config = match self.config.fetch_config().await {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Terminal config unavailable, card payment not started");
                return CardPaymentState::Error(TERMINAL_CONFIG_MISSING.to_string());
            }
        };

        if let Err(e) = self.ensure_logged_in().await {
            return CardPaymentState::Error(format!("card reader login failed: {e}"));
        }

        let checkout = self.build_checkout(request, &config);
        let result_rx = self.callbacks.register(CallbackChannel::Payment);
        self.state_tx
            .send_replace(CardPaymentState::Started(request.id()));
        info!(request_id = %request.id(), "Launching card checkout");
        if let Err(e) = self.sdk.launch_checkout(&checkout, CallbackChannel::Payment) {
            self.callbacks.cancel(CallbackChannel::Payment);
            return CardPaymentState::Error(e.to_string());
        }

        match result_rx.await {
            Ok(result) => map_checkout_result(result),
            Err(_) => CardPaymentState::Error(SdkError::Abandoned.to_string()),
        }
    }

    async fn ensure_logged_in(&self) -> Result<(), SdkError> {
        if self.sdk.is_logged_in() {
            return Ok(());
        }
        info!("Card reader not logged in, starting login");
        let result = self
            .launch_and_wait(CallbackChannel::Login, |sdk, channel| sdk.launch_login(channel))
            .await?;
        match result.code {
            ActivityCode::Ok => Ok(()),
            code => Err(SdkError::Result(code)),
        }
    }

    async fn launch_and_wait(
        &self,
        channel: CallbackChannel,
        launch: impl FnOnce(&dyn CardSdk, CallbackChannel) -> Result<(), SdkError>,
    ) -> Result<ActivityResult, SdkError> {
        let rx = self.callbacks.register(channel);
        if let Err(e) = launch(self.sdk.as_ref(), channel) {
            self.callbacks.cancel(channel);
            return Err(e);
        }
        rx.await.map_err(|_| SdkError::Abandoned)
    }

    fn build_checkout(&self, request: &PaymentRequest, config: &TerminalConfig) -> Checkout {
        let mut metadata = BTreeMap::new();
        metadata.insert("merchant_id".to_string(), config.merchant_id.to_string());
        metadata.insert("terminal_id".to_string(), config.terminal_id.to_string());
        if let Some(register) = &config.cash_register_id {
            metadata.insert("cash_register_id".to_string(), register.to_string());
        }
        metadata.insert("tag_uid".to_string(), request.tag().to_string());
        Checkout {
            amount: request.amount().value(),
            tip: request.tip(),
            currency: self.settings.currency.clone(),
            title: config.checkout_title(&self.settings.merchant_label),
            foreign_transaction_id: request.id(),
            metadata,
        }
    }
}

pub(crate) fn map_checkout_result(result: ActivityResult) -> CardPaymentState {
    if result.code != ActivityCode::Ok {
        return CardPaymentState::Failed(format!("checkout ended with {:?}", result.code));
    }
    let Some(payload) = result.payload else {
        return CardPaymentState::Error("checkout returned no result".to_string());
    };
    if !payload.is_success() {
        return CardPaymentState::Failed(
            payload
                .message
                .unwrap_or_else(|| format!("checkout result code {}", payload.result_code)),
        );
    }
    CardPaymentState::Success(payload.token.unwrap_or_default())
}

//! One customer payment from tag scan to booking.
//!
//! The orchestrator never books directly: every taken payment is pushed to
//! the durable queue first, and the replay processor does the network call.
//! The cashier then gets either a confirmed booking or a "queued" receipt
//! after a short wait, and the payment is safe either way.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::card::{CardPaymentGateway, CardPaymentState};
use crate::entities::{
    Amount, AmountError, PaymentMethod, PaymentRequest, RequestKind, TagIdentity,
};
use crate::events::{BookingEvent, BookingEventReceiver, BookingEventSender};
use crate::queue::{DurableRequestQueue, StoreError};
use crate::tags::{ScanOutcome, ScanSession};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    /// The backend confirmed the booking.
    Booked,
    /// The booking is queued and will be replayed.
    Queued,
    /// The backend rejected the booking and it waits for an operator.
    Parked(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub request: PaymentRequest,
    pub outcome: BookingOutcome,
    /// Card processor token, for card payments.
    pub card_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Idle,
    AwaitingTag,
    Charging(Uuid),
    Booking(Uuid),
    Completed(PaymentReceipt),
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("tag scan was closed before a tag was read")]
    NoTag,
    #[error("tag scan failed: {0:?}")]
    Scan(ScanOutcome),
    #[error("invalid payment: {0}")]
    Amount(#[from] AmountError),
    /// The card was not charged. The request is returned so a retry keeps
    /// its id.
    #[error("card payment did not complete: {state:?}")]
    Card {
        request: Box<PaymentRequest>,
        state: CardPaymentState,
    },
    #[error("request was taken as {0}, not by card")]
    NotCard(PaymentMethod),
    /// The card was already charged for this request and its booking is
    /// queued.
    #[error("request {0} is already charged")]
    AlreadyCharged(Uuid),
    /// The money was taken but the booking could not be persisted.
    #[error("payment could not be queued: {0}")]
    Queue(#[from] StoreError),
}

/// Observable status of the payment in progress.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    tx: Arc<watch::Sender<PaymentStatus>>,
}

impl Default for PaymentSession {
    fn default() -> Self {
        let (tx, _) = watch::channel(PaymentStatus::Idle);
        Self { tx: Arc::new(tx) }
    }
}

impl PaymentSession {
    pub fn status(&self) -> watch::Receiver<PaymentStatus> {
        self.tx.subscribe()
    }

    pub fn stream(&self) -> WatchStream<PaymentStatus> {
        WatchStream::new(self.tx.subscribe())
    }

    pub fn current(&self) -> PaymentStatus {
        self.tx.borrow().clone()
    }

    /// Back to `Idle`, e.g. when the cashier starts the next customer.
    pub fn reset(&self) {
        self.tx.send_replace(PaymentStatus::Idle);
    }

    fn set(&self, status: PaymentStatus) {
        self.tx.send_replace(status);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// How long to wait for the backend before reporting a payment as
    /// queued.
    pub confirmation_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(5),
        }
    }
}

pub struct PaymentOrchestrator {
    scan: ScanSession,
    gateway: Arc<CardPaymentGateway>,
    queue: DurableRequestQueue,
    events: BookingEventSender,
    session: PaymentSession,
    settings: OrchestratorSettings,
}

impl PaymentOrchestrator {
    /// `events` must be the sender the replay processor publishes on.
    pub fn new(
        scan: ScanSession,
        gateway: Arc<CardPaymentGateway>,
        queue: DurableRequestQueue,
        events: BookingEventSender,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            scan,
            gateway,
            queue,
            events,
            session: PaymentSession::default(),
            settings,
        }
    }

    pub fn session(&self) -> &PaymentSession {
        &self.session
    }

    pub fn scan_session(&self) -> &ScanSession {
        &self.scan
    }

    pub fn gateway(&self) -> &CardPaymentGateway {
        &self.gateway
    }

    /// Scan until a valid tag is read or scanning cannot succeed.
    pub async fn scan_tag(&self) -> Result<TagIdentity, PaymentError> {
        self.session.set(PaymentStatus::AwaitingTag);
        self.scan.open().await;
        let outcome = self.scan.next_outcome().await;
        self.scan.close().await;
        match outcome {
            Some(ScanOutcome::Success(tag)) => Ok(tag),
            Some(other) => Err(self.fail(PaymentError::Scan(other))),
            None => Err(self.fail(PaymentError::NoTag)),
        }
    }

    /// Record a cash top-up. The cash is already in the till, so the booking
    /// is queued unconditionally.
    pub async fn pay_with_cash(
        &self,
        tag: TagIdentity,
        amount: Decimal,
        tip: Decimal,
    ) -> Result<PaymentReceipt, PaymentError> {
        let request = self.build_request(tag, amount, tip, PaymentMethod::Cash)?;
        self.book(request, None).await
    }

    pub async fn pay_with_card(
        &self,
        tag: TagIdentity,
        amount: Decimal,
        tip: Decimal,
    ) -> Result<PaymentReceipt, PaymentError> {
        let request = self.build_request(tag, amount, tip, PaymentMethod::Card)?;
        self.retry_card(request).await
    }

    /// Run the card checkout for a request, which may be one returned by a
    /// failed earlier attempt.
    ///
    /// Cash requests and requests whose booking is already queued are
    /// refused without touching the card reader.
    pub async fn retry_card(&self, request: PaymentRequest) -> Result<PaymentReceipt, PaymentError> {
        if request.method() != PaymentMethod::Card {
            return Err(self.fail(PaymentError::NotCard(request.method())));
        }
        match self.queue.get(request.id()).await {
            Ok(None) => {}
            Ok(Some(_)) => return Err(self.fail(PaymentError::AlreadyCharged(request.id()))),
            Err(e) => return Err(self.fail(e.into())),
        }
        self.session.set(PaymentStatus::Charging(request.id()));
        match self.gateway.pay(&request).await {
            CardPaymentState::Success(token) => self.book(request, Some(token)).await,
            state => Err(self.fail(PaymentError::Card {
                request: Box::new(request),
                state,
            })),
        }
    }

    fn build_request(
        &self,
        tag: TagIdentity,
        amount: Decimal,
        tip: Decimal,
        method: PaymentMethod,
    ) -> Result<PaymentRequest, PaymentError> {
        let request = Amount::new(amount)
            .and_then(|amount| PaymentRequest::new(tag, amount, tip, method));
        request.map_err(|e| self.fail(e.into()))
    }

    async fn book(
        &self,
        request: PaymentRequest,
        card_token: Option<String>,
    ) -> Result<PaymentReceipt, PaymentError> {
        self.session.set(PaymentStatus::Booking(request.id()));
        // Subscribe before pushing so the confirmation cannot be missed.
        let mut events = self.events.subscribe();

        if let Err(e) = self.queue.push(RequestKind::TopUp, &request).await {
            error!(
                request_id = %request.id(),
                method = %request.method(),
                total = %request.total(),
                error = %e,
                "Payment taken but could not be queued"
            );
            return Err(self.fail(e.into()));
        }

        let outcome = self.await_booking(request.id(), &mut events).await;
        info!(request_id = %request.id(), ?outcome, "Payment completed");
        let receipt = PaymentReceipt {
            request,
            outcome,
            card_token,
        };
        self.session.set(PaymentStatus::Completed(receipt.clone()));
        Ok(receipt)
    }

    async fn await_booking(&self, id: Uuid, events: &mut BookingEventReceiver) -> BookingOutcome {
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(BookingEvent::Booked { request_id, .. }) if request_id == id => {
                        return BookingOutcome::Booked;
                    }
                    Ok(BookingEvent::Parked { request_id, error }) if request_id == id => {
                        return BookingOutcome::Parked(error.to_string());
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Booking events lagged, checking the queue");
                        if let Ok(None) = self.queue.get(id).await {
                            return BookingOutcome::Booked;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return BookingOutcome::Queued,
                }
            }
        };
        tokio::time::timeout(self.settings.confirmation_timeout, wait)
            .await
            .unwrap_or(BookingOutcome::Queued)
    }

    fn fail(&self, error: PaymentError) -> PaymentError {
        warn!(error = %error, "Payment failed");
        self.session.set(PaymentStatus::Failed(error.to_string()));
        error
    }
}

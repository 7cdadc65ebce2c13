#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use festpay_core::card::{
    ActivityResult, CallbackChannel, CallbackRouter, CardPaymentGateway, CardSdk, CardSettings,
    Checkout, SdkError,
};
use festpay_core::config::{ConfigStore, TerminalConfig};
use festpay_core::entities::{PaymentRequest, RequestKind, TagIdentity};
use festpay_core::events::{BookingEventSender, booking_event_channel};
use festpay_core::orchestrator::{OrchestratorSettings, PaymentOrchestrator};
use festpay_core::processors::{BookingBackend, ReplayPolicy, ReplayProcessor};
use festpay_core::queue::{DurableRequestQueue, InMemoryRequestStore, PendingRequestStore};
use festpay_core::tags::{
    DEFAULT_CONTENT_MARKER, RawTag, ScanOptions, ScanSession, TagReadError, TagReader,
    TagValidator,
};
use festpay_sdk::objects::{BookingError, BookingReceipt};
use uuid::Uuid;

/// Reader playing back scripted reads. Once the script is empty it waits
/// like a reader with nothing in the field, until more reads are pushed.
#[derive(Default)]
pub struct FakeReader {
    script: Mutex<VecDeque<Result<RawTag, TagReadError>>>,
    pushed: tokio::sync::Notify,
}

impl FakeReader {
    pub fn new(script: impl IntoIterator<Item = Result<RawTag, TagReadError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            pushed: tokio::sync::Notify::new(),
        })
    }

    pub fn push(&self, read: Result<RawTag, TagReadError>) {
        self.script.lock().unwrap().push_back(read);
        self.pushed.notify_one();
    }
}

#[async_trait]
impl TagReader for FakeReader {
    async fn read(&self) -> Result<RawTag, TagReadError> {
        loop {
            if let Some(read) = self.script.lock().unwrap().pop_front() {
                return read;
            }
            self.pushed.notified().await;
        }
    }
}

pub fn provisioned(uid: u64) -> Result<RawTag, TagReadError> {
    Ok(RawTag {
        uid,
        content: Bytes::from_static(DEFAULT_CONTENT_MARKER),
    })
}

pub fn scan_session(reader: Arc<FakeReader>) -> ScanSession {
    ScanSession::new(
        Arc::new(TagValidator::new(reader)),
        ScanOptions::default(),
    )
}

/// A validated identity for `uid`, obtained the only way there is: a scan.
pub async fn tag(uid: u64) -> TagIdentity {
    let validator = TagValidator::new(FakeReader::new([provisioned(uid)]));
    match validator.scan().await {
        festpay_core::tags::ScanOutcome::Success(tag) => tag,
        other => panic!("provisioned tag did not validate: {other:?}"),
    }
}

/// Backend answering each request id from its own script. The last answer
/// repeats once the script runs out; unscripted ids are booked.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<Uuid, VecDeque<Result<BookingReceipt, BookingError>>>>,
    attempts: Mutex<HashMap<Uuid, u32>>,
    default_answer: Mutex<Option<Result<BookingReceipt, BookingError>>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A backend failing every request with `error` until scripted otherwise.
    pub fn failing(error: BookingError) -> Arc<Self> {
        let backend = Self::default();
        *backend.default_answer.lock().unwrap() = Some(Err(error));
        Arc::new(backend)
    }

    pub fn script(&self, id: Uuid, answers: Vec<Result<BookingReceipt, BookingError>>) {
        self.scripts.lock().unwrap().insert(id, answers.into());
    }

    pub fn recover(&self) {
        *self.default_answer.lock().unwrap() = None;
    }

    pub fn attempts(&self, id: Uuid) -> u32 {
        self.attempts.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl BookingBackend for ScriptedBackend {
    async fn book(
        &self,
        _kind: RequestKind,
        request: &PaymentRequest,
    ) -> Result<BookingReceipt, BookingError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(request.id())
            .or_default() += 1;
        let mut scripts = self.scripts.lock().unwrap();
        if let Some(script) = scripts.get_mut(&request.id()) {
            let answer = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            if let Some(answer) = answer {
                return answer;
            }
        }
        self.default_answer
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Ok(BookingReceipt::Booked))
    }
}

/// Card SDK that is logged in and answers every checkout with a fixed
/// result, or leaves it open when no result is set.
pub struct FakeCardSdk {
    pub router: CallbackRouter,
    pub result: Mutex<Option<ActivityResult>>,
    pub checkouts: Mutex<Vec<Checkout>>,
    logged_in: AtomicBool,
}

impl FakeCardSdk {
    pub fn new(result: Option<ActivityResult>) -> Arc<Self> {
        Arc::new(Self {
            router: CallbackRouter::new(),
            result: Mutex::new(result),
            checkouts: Mutex::new(Vec::new()),
            logged_in: AtomicBool::new(true),
        })
    }

    pub fn checkout_ids(&self) -> Vec<Uuid> {
        self.checkouts
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.foreign_transaction_id)
            .collect()
    }
}

impl CardSdk for FakeCardSdk {
    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn launch_login(&self, channel: CallbackChannel) -> Result<(), SdkError> {
        self.logged_in.store(true, Ordering::SeqCst);
        self.router.deliver(channel.code(), ActivityResult::ok());
        Ok(())
    }

    fn launch_checkout(&self, checkout: &Checkout, channel: CallbackChannel) -> Result<(), SdkError> {
        self.checkouts.lock().unwrap().push(checkout.clone());
        if let Some(result) = self.result.lock().unwrap().clone() {
            self.router.deliver(channel.code(), result);
        }
        Ok(())
    }

    fn launch_settings(&self, channel: CallbackChannel) -> Result<(), SdkError> {
        self.router.deliver(channel.code(), ActivityResult::ok());
        Ok(())
    }
}

pub fn terminal_config() -> Arc<ConfigStore<Option<TerminalConfig>>> {
    Arc::new(ConfigStore::new(Some(TerminalConfig {
        merchant_id: "m-1".into(),
        terminal_id: "bar-3".into(),
        cash_register_id: None,
    })))
}

pub fn fast_policy() -> ReplayPolicy {
    ReplayPolicy {
        pass_delay: Duration::ZERO,
        ..ReplayPolicy::default()
    }
}

/// A complete terminal wired to in-memory storage and fakes.
pub struct Terminal {
    pub reader: Arc<FakeReader>,
    pub sdk: Arc<FakeCardSdk>,
    pub backend: Arc<ScriptedBackend>,
    pub store: Arc<InMemoryRequestStore>,
    pub queue: DurableRequestQueue,
    pub events: BookingEventSender,
    pub orchestrator: PaymentOrchestrator,
    pub processor: Option<ReplayProcessor>,
}

impl Terminal {
    pub fn new(backend: Arc<ScriptedBackend>, card_result: Option<ActivityResult>) -> Self {
        let reader = FakeReader::new([]);
        let sdk = FakeCardSdk::new(card_result);
        let store = Arc::new(InMemoryRequestStore::new());
        let queue = DurableRequestQueue::new(store.clone() as Arc<dyn PendingRequestStore>);
        let (events, _) = booking_event_channel();
        let gateway = Arc::new(CardPaymentGateway::new(
            terminal_config(),
            sdk.clone(),
            sdk.router.clone(),
            CardSettings::default(),
        ));
        let orchestrator = PaymentOrchestrator::new(
            scan_session(reader.clone()),
            gateway,
            queue.clone(),
            events.clone(),
            OrchestratorSettings {
                confirmation_timeout: Duration::from_millis(500),
            },
        );
        let processor = ReplayProcessor::new(
            queue.clone(),
            backend.clone(),
            ConfigStore::new(fast_policy()),
            events.clone(),
        );
        Self {
            reader,
            sdk,
            backend,
            store,
            queue,
            events,
            orchestrator,
            processor: Some(processor),
        }
    }

    /// Start the replay processor in the background.
    pub fn spawn_processor(&mut self) -> tokio::sync::watch::Sender<bool> {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        if let Some(processor) = self.processor.take() {
            tokio::spawn(processor.run(shutdown_rx));
        }
        shutdown_tx
    }
}

//! ReplayProcessor.
//!
//! The ReplayProcessor is responsible for:
//! - Replaying every queued booking once on start (restart recovery)
//! - Replaying again whenever a new request enters the queue
//! - Bounding each activation to a fixed number of passes over the queue
//! - Removing confirmed requests and parking rejected ones per policy
//! - Reporting the requests still stuck after an activation
//!
//! Requests are never dropped here: a request leaves the queue only when the
//! backend confirms it, or when an operator discards it.

use std::sync::Arc;
use std::time::Duration;

use festpay_sdk::objects::{BookingError, BookingReceipt};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::booking::BookingBackend;
use crate::config::ConfigStore;
use crate::entities::QueuedRequest;
use crate::events::{BookingEvent, BookingEventSender};
use crate::queue::{DurableRequestQueue, QueueWatcher};

/// What to do with requests the backend rejects for a business reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionPolicy {
    /// Keep replaying them like any other failure.
    #[default]
    Retry,
    /// Move them out of the replay set until an operator requeues them.
    Park,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayDecision {
    Remove(BookingReceipt),
    Retry(BookingError),
    Park(BookingError),
}

impl RejectionPolicy {
    pub fn decide(self, result: Result<BookingReceipt, BookingError>) -> ReplayDecision {
        match result {
            Ok(receipt) => ReplayDecision::Remove(receipt),
            Err(e) if self == RejectionPolicy::Park && e.is_rejection() => ReplayDecision::Park(e),
            Err(e) => ReplayDecision::Retry(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayPolicy {
    /// Passes over the queue per activation. At least one.
    pub passes: u32,
    pub pass_delay: Duration,
    pub business_rejections: RejectionPolicy,
    /// Re-activate after this much idle time while requests remain.
    pub idle_reactivation: Option<Duration>,
}

impl Default for ReplayPolicy {
    fn default() -> Self {
        Self {
            passes: 3,
            pass_delay: Duration::from_secs(1),
            business_rejections: RejectionPolicy::Retry,
            idle_reactivation: None,
        }
    }
}

/// Summary of one activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Passes that found work.
    pub passes: u32,
    pub attempts: u32,
    pub booked: u32,
    pub parked: u32,
    /// Requests still waiting for a booking after the activation.
    pub stuck: Vec<Uuid>,
}

impl ReplayReport {
    pub fn pending(&self) -> usize {
        self.stuck.len()
    }
}

pub struct ReplayProcessor {
    queue: DurableRequestQueue,
    backend: Arc<dyn BookingBackend>,
    policy: ConfigStore<ReplayPolicy>,
    events: BookingEventSender,
    report_tx: watch::Sender<ReplayReport>,
}

impl ReplayProcessor {
    /// Create a new ReplayProcessor.
    ///
    /// # Arguments
    ///
    /// * `queue` - The queue to replay
    /// * `backend` - Where bookings are sent
    /// * `policy` - Replay policy, may be swapped while running
    /// * `events` - Sender for per-request BookingEvent events
    pub fn new(
        queue: DurableRequestQueue,
        backend: Arc<dyn BookingBackend>,
        policy: ConfigStore<ReplayPolicy>,
        events: BookingEventSender,
    ) -> Self {
        let (report_tx, _) = watch::channel(ReplayReport::default());
        Self {
            queue,
            backend,
            policy,
            events,
            report_tx,
        }
    }

    /// Reports of finished activations, latest first.
    pub fn reports(&self) -> watch::Receiver<ReplayReport> {
        self.report_tx.subscribe()
    }

    /// Run the ReplayProcessor until shutdown.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("ReplayProcessor started");
        let mut watcher = self.queue.subscribe();

        let mut report = self.activate(&mut watcher, &mut shutdown_rx).await;

        while !*shutdown_rx.borrow() {
            let idle = if report.stuck.is_empty() {
                None
            } else {
                self.policy.read().idle_reactivation
            };

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("ReplayProcessor received shutdown signal");
                        break;
                    }
                }

                changed = watcher.changed() => {
                    if changed.is_err() {
                        info!("Request queue closed");
                        break;
                    }
                    debug!("Request queue changed");
                    report = self.activate(&mut watcher, &mut shutdown_rx).await;
                }

                _ = idle_timer(idle) => {
                    debug!(pending = report.pending(), "Idle reactivation");
                    report = self.activate(&mut watcher, &mut shutdown_rx).await;
                }
            }
        }

        info!("ReplayProcessor shutdown complete");
    }

    /// Run one activation now, outside of [`run`](Self::run).
    pub async fn run_activation(&self) -> ReplayReport {
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut watcher = self.queue.subscribe();
        self.activate(&mut watcher, &mut shutdown_rx).await
    }

    async fn activate(
        &self,
        watcher: &mut QueueWatcher,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> ReplayReport {
        // Anything inserted after this point wakes the next activation.
        watcher.mark_seen();
        let policy = self.policy.snapshot();
        let mut report = ReplayReport::default();

        for pass in 0..policy.passes.max(1) {
            if pass > 0 && pause(policy.pass_delay, shutdown_rx).await {
                info!("Replay interrupted by shutdown");
                break;
            }
            let entries = match self.queue.pending().await {
                Ok(entries) => entries,
                Err(e) => {
                    error!(error = %e, "Failed to read the request queue");
                    break;
                }
            };
            if entries.is_empty() {
                break;
            }
            report.passes += 1;
            debug!(pass, entries = entries.len(), "Replaying queued requests");

            for entry in entries {
                report.attempts += 1;
                let result = self.backend.book(entry.kind, &entry.request).await;
                let decision = policy.business_rejections.decide(result);
                self.apply(&entry, decision, &mut report).await;
            }
        }

        report.stuck = match self.queue.pending().await {
            Ok(entries) => entries.into_iter().map(|e| e.id).collect(),
            Err(e) => {
                error!(error = %e, "Failed to read the request queue");
                Vec::new()
            }
        };
        if !report.stuck.is_empty() {
            warn!(
                pending = report.stuck.len(),
                requests = ?report.stuck,
                "Requests still not booked after replay"
            );
        } else if report.attempts > 0 {
            info!(booked = report.booked, parked = report.parked, "Request queue drained");
        }
        self.report_tx.send_replace(report.clone());
        report
    }

    async fn apply(&self, entry: &QueuedRequest, decision: ReplayDecision, report: &mut ReplayReport) {
        let store = self.queue.store();
        match decision {
            ReplayDecision::Remove(receipt) => {
                if let Err(e) = store.remove(entry.id).await {
                    // The entry stays and the next attempt is answered as
                    // already applied.
                    error!(request_id = %entry.id, error = %e, "Failed to remove booked request");
                }
                report.booked += 1;
                info!(request_id = %entry.id, ?receipt, "Request booked");
                let _ = self.events.send(BookingEvent::Booked {
                    request_id: entry.id,
                    receipt,
                });
            }
            ReplayDecision::Retry(error) => {
                if let Err(e) = store.record_attempt(entry.id).await {
                    error!(request_id = %entry.id, error = %e, "Failed to record booking attempt");
                }
                let attempts = entry.attempts.saturating_add(1);
                warn!(request_id = %entry.id, attempts, error = %error, "Booking deferred");
                let _ = self.events.send(BookingEvent::Deferred {
                    request_id: entry.id,
                    attempts,
                    error,
                });
            }
            ReplayDecision::Park(error) => {
                match store.park(entry.id, &error.to_string()).await {
                    Ok(_) => report.parked += 1,
                    Err(e) => {
                        error!(request_id = %entry.id, error = %e, "Failed to park rejected request")
                    }
                }
                warn!(request_id = %entry.id, error = %error, "Booking rejected, request parked");
                let _ = self.events.send(BookingEvent::Parked {
                    request_id: entry.id,
                    error,
                });
            }
        }
    }
}

/// Sleep, returning `true` early if shutdown is signalled.
async fn pause(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if *shutdown_rx.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
    }
}

async fn idle_timer(idle: Option<Duration>) {
    match idle {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Amount, PaymentMethod, PaymentRequest, RequestKind, TagIdentity};
    use crate::events::booking_event_channel;
    use crate::queue::InMemoryRequestStore;
    use async_trait::async_trait;
    use festpay_sdk::objects::ServiceError;
    use rust_decimal_macros::dec;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Answers each request from its own script; an exhausted script keeps
    /// repeating its last answer.
    #[derive(Default)]
    struct ScriptedBackend {
        scripts: Mutex<HashMap<Uuid, VecDeque<Result<BookingReceipt, BookingError>>>>,
        calls: Mutex<Vec<Uuid>>,
    }

    impl ScriptedBackend {
        fn script(&self, id: Uuid, answers: Vec<Result<BookingReceipt, BookingError>>) {
            self.scripts.lock().unwrap().insert(id, answers.into());
        }

        fn calls(&self) -> Vec<Uuid> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BookingBackend for ScriptedBackend {
        async fn book(
            &self,
            _kind: RequestKind,
            request: &PaymentRequest,
        ) -> Result<BookingReceipt, BookingError> {
            self.calls.lock().unwrap().push(request.id());
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(request.id()).or_default();
            match script.len() {
                0 => Ok(BookingReceipt::Booked),
                1 => script[0].clone(),
                _ => script.pop_front().unwrap_or(Ok(BookingReceipt::Booked)),
            }
        }
    }

    fn request(uid: u64) -> PaymentRequest {
        PaymentRequest::new(
            TagIdentity::new(uid, None),
            Amount::new(dec!(10)).unwrap(),
            dec!(0),
            PaymentMethod::Cash,
        )
        .unwrap()
    }

    fn processor(
        backend: Arc<ScriptedBackend>,
        policy: ReplayPolicy,
    ) -> (ReplayProcessor, DurableRequestQueue) {
        let queue = DurableRequestQueue::new(Arc::new(InMemoryRequestStore::new()));
        let (events, _) = booking_event_channel();
        let processor =
            ReplayProcessor::new(queue.clone(), backend, ConfigStore::new(policy), events);
        (processor, queue)
    }

    fn no_delay() -> ReplayPolicy {
        ReplayPolicy {
            pass_delay: Duration::ZERO,
            ..ReplayPolicy::default()
        }
    }

    #[test]
    fn test_decisions() {
        let rejection = Err(BookingError::Service(ServiceError::InsufficientFunds));
        assert!(matches!(
            RejectionPolicy::Retry.decide(rejection.clone()),
            ReplayDecision::Retry(_)
        ));
        assert!(matches!(
            RejectionPolicy::Park.decide(rejection),
            ReplayDecision::Park(_)
        ));
        assert!(matches!(
            RejectionPolicy::Park.decide(Err(BookingError::Server(503))),
            ReplayDecision::Retry(_)
        ));
        assert_eq!(
            RejectionPolicy::Park.decide(Ok(BookingReceipt::AlreadyApplied)),
            ReplayDecision::Remove(BookingReceipt::AlreadyApplied)
        );
    }

    #[tokio::test]
    async fn test_each_activation_is_bounded() {
        let backend = Arc::new(ScriptedBackend::default());
        let (processor, queue) = processor(backend.clone(), no_delay());
        let request = request(1);
        backend.script(request.id(), vec![Err(BookingError::Server(503))]);
        queue.push(RequestKind::TopUp, &request).await.unwrap();

        let report = processor.run_activation().await;

        assert_eq!(report.attempts, 3);
        assert_eq!(report.passes, 3);
        assert_eq!(report.stuck, vec![request.id()]);
        assert_eq!(backend.calls().len(), 3);
        assert_eq!(queue.get(request.id()).await.unwrap().unwrap().attempts, 3);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_later_entries() {
        let backend = Arc::new(ScriptedBackend::default());
        let (processor, queue) = processor(backend.clone(), no_delay());
        let (first, second) = (request(1), request(2));
        backend.script(
            first.id(),
            vec![Err(BookingError::Request("timeout".to_string()))],
        );
        queue.push(RequestKind::TopUp, &first).await.unwrap();
        queue.push(RequestKind::TopUp, &second).await.unwrap();

        let report = processor.run_activation().await;

        assert_eq!(report.booked, 1);
        assert_eq!(backend.calls()[..2], [first.id(), second.id()]);
        assert_eq!(report.stuck, vec![first.id()]);
    }

    #[tokio::test]
    async fn test_stops_early_once_drained() {
        let backend = Arc::new(ScriptedBackend::default());
        let (processor, queue) = processor(backend.clone(), no_delay());
        let request = request(1);
        backend.script(
            request.id(),
            vec![Err(BookingError::Server(500)), Ok(BookingReceipt::Booked)],
        );
        queue.push(RequestKind::TopUp, &request).await.unwrap();

        let report = processor.run_activation().await;

        assert_eq!(report.passes, 2);
        assert_eq!(report.attempts, 2);
        assert!(report.stuck.is_empty());
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_park_policy_moves_rejections_aside() {
        let backend = Arc::new(ScriptedBackend::default());
        let policy = ReplayPolicy {
            business_rejections: RejectionPolicy::Park,
            ..no_delay()
        };
        let (processor, queue) = processor(backend.clone(), policy);
        let request = request(1);
        backend.script(
            request.id(),
            vec![Err(BookingError::Service(ServiceError::InsufficientFunds))],
        );
        queue.push(RequestKind::TopUp, &request).await.unwrap();

        let report = processor.run_activation().await;

        assert_eq!(report.attempts, 1);
        assert_eq!(report.parked, 1);
        assert!(report.stuck.is_empty());
        assert_eq!(queue.parked().await.unwrap().len(), 1);
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_policy_swap_applies_to_next_activation() {
        let backend = Arc::new(ScriptedBackend::default());
        let policy = ConfigStore::new(no_delay());
        let queue = DurableRequestQueue::new(Arc::new(InMemoryRequestStore::new()));
        let (events, _) = booking_event_channel();
        let processor =
            ReplayProcessor::new(queue.clone(), backend.clone(), policy.clone(), events);
        let request = request(1);
        backend.script(request.id(), vec![Err(BookingError::Server(502))]);
        queue.push(RequestKind::TopUp, &request).await.unwrap();

        policy.update(ReplayPolicy {
            passes: 1,
            ..no_delay()
        });
        let report = processor.run_activation().await;

        assert_eq!(report.attempts, 1);
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let backend = Arc::new(ScriptedBackend::default());
        let queue = DurableRequestQueue::new(Arc::new(InMemoryRequestStore::new()));
        let (events, mut rx) = booking_event_channel();
        let processor = ReplayProcessor::new(
            queue.clone(),
            backend.clone(),
            ConfigStore::new(no_delay()),
            events,
        );
        let request = request(1);
        backend.script(
            request.id(),
            vec![Err(BookingError::Server(500)), Ok(BookingReceipt::Booked)],
        );
        queue.push(RequestKind::TopUp, &request).await.unwrap();

        processor.run_activation().await;

        assert_eq!(
            rx.recv().await.unwrap(),
            BookingEvent::Deferred {
                request_id: request.id(),
                attempts: 1,
                error: BookingError::Server(500),
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            BookingEvent::Booked {
                request_id: request.id(),
                receipt: BookingReceipt::Booked,
            }
        );
    }
}

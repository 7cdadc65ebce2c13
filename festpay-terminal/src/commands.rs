//! Subcommand handlers.

use crate::config::{ConfigLoader, LoadedConfig};
use crate::shutdown::{shutdown_signal, spawn_config_reload_handler};
use crate::state::TerminalState;
use festpay_core::config::TerminalConfigProvider;
use festpay_core::entities::QueuedRequest;
use festpay_core::events::{BookingEvent, BookingEventReceiver, booking_event_channel};
use festpay_core::processors::ReplayProcessor;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use uuid::Uuid;

/// Replay the durable queue against the backend until SIGTERM/SIGINT.
pub async fn run(state: TerminalState, config_loader: Arc<ConfigLoader>) -> anyhow::Result<()> {
    let pending = state.queue.len().await?;
    tracing::info!(pending, "Request queue opened");

    let (events_tx, events_rx) = booking_event_channel();
    let processor = ReplayProcessor::new(
        state.queue.clone(),
        Arc::new(state.client.clone()),
        state.replay_policy.clone(),
        events_tx,
    );
    let mut reports = processor.reports();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader)?;

    let processor_handle = tokio::spawn(processor.run(shutdown_rx.clone()));
    let events_handle = tokio::spawn(log_booking_events(events_rx, shutdown_rx));
    let reports_handle = tokio::spawn(async move {
        while reports.changed().await.is_ok() {
            let report = reports.borrow_and_update().clone();
            if report.stuck.is_empty() {
                tracing::info!(booked = report.booked, "Request queue drained");
            } else {
                tracing::warn!(
                    booked = report.booked,
                    parked = report.parked,
                    stuck = report.pending(),
                    "Requests still waiting for the backend"
                );
            }
        }
    });

    let signal_result = shutdown_signal().await;
    if let Err(e) = &signal_result {
        tracing::error!(error = %e, "Failed to install signal handlers");
    }

    tracing::info!("Stopping replay processor...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = processor_handle.await {
        tracing::error!(error = %e, "Replay processor task failed");
    }
    let _ = events_handle.await;
    reports_handle.abort();
    reload_notify.notify_one();

    let remaining = state.queue.len().await?;
    state.close().await;
    tracing::info!(remaining, "Terminal shutdown complete");

    signal_result.map_err(Into::into)
}

async fn log_booking_events(mut events: BookingEventReceiver, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => break,

            event = events.recv() => match event {
                Ok(BookingEvent::Booked { request_id, receipt }) => {
                    tracing::info!(%request_id, ?receipt, "Booking confirmed");
                }
                Ok(BookingEvent::Deferred { request_id, attempts, error }) => {
                    tracing::debug!(%request_id, attempts, %error, "Booking deferred");
                }
                Ok(BookingEvent::Parked { request_id, error }) => {
                    tracing::warn!(%request_id, %error, "Booking parked, operator action needed");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Booking event log lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

/// Print the replay set and the parked requests.
pub async fn pending(state: &TerminalState) -> anyhow::Result<()> {
    let pending = state.queue.pending().await?;
    let parked = state.queue.parked().await?;

    println!("pending: {}", pending.len());
    for entry in &pending {
        println!("  {}", describe(entry));
    }
    println!("parked: {}", parked.len());
    for entry in &parked {
        println!(
            "  {} reason={}",
            describe(entry),
            entry.parked.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}

fn describe(entry: &QueuedRequest) -> String {
    format!(
        "{} {} tag={} {} total={} attempts={} queued_at={}",
        entry.id,
        entry.kind,
        entry.request.tag(),
        entry.request.method(),
        entry.request.total(),
        entry.attempts,
        entry.queued_at,
    )
}

pub async fn discard(state: &TerminalState, id: Uuid) -> anyhow::Result<()> {
    if !state.queue.discard(id).await? {
        anyhow::bail!("no queued request with id {id}");
    }
    println!("discarded {id}");
    Ok(())
}

pub async fn requeue(state: &TerminalState, id: Uuid) -> anyhow::Result<()> {
    if !state.queue.requeue(id).await? {
        anyhow::bail!("no parked request with id {id}");
    }
    println!("requeued {id}");
    Ok(())
}

/// Validate the config file and report what the terminal would run with.
pub async fn check_config(state: &TerminalState, config: &LoadedConfig) -> anyhow::Result<()> {
    println!("backend: {} (key {})", config.backend.base_url, config.backend.key_id);
    println!("queue: {}", config.database_path.display());
    println!(
        "replay: passes={} pass_delay={:?} business_rejections={:?} idle_reactivation={:?}",
        config.replay.passes,
        config.replay.pass_delay,
        config.replay.business_rejections,
        config.replay.idle_reactivation,
    );
    println!(
        "tags: content_marker={}",
        String::from_utf8_lossy(&config.content_marker)
    );
    println!(
        "card: currency={} merchant_label={}",
        config.card.currency, config.card.merchant_label
    );

    match state.terminal_config_provider().fetch_config().await {
        Ok(terminal) => println!(
            "terminal: {} (merchant {}, cash register {})",
            terminal.terminal_id,
            terminal.merchant_id,
            terminal.cash_register_id.as_deref().unwrap_or("-"),
        ),
        Err(e) => println!("terminal: unavailable ({e})"),
    }
    println!("queued requests: {}", state.queue.len().await?);
    Ok(())
}

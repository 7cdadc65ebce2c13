//! Booking events published by the replay processor.
//!
//! # Event Flow
//!
//! 1. A payment is pushed to the durable queue, which wakes `ReplayProcessor`
//! 2. `ReplayProcessor` replays the queue and emits one `BookingEvent` per
//!    attempt outcome
//! 3. `PaymentOrchestrator` waits for the event of its own request to tell the
//!    cashier whether the booking is confirmed or still queued
//!
//! Events are ephemeral. The queue is the source of truth: a subscriber that
//! lags behind re-reads the queue instead of relying on missed events.

pub mod channels;
pub mod types;

pub use channels::{
    BookingEventReceiver, BookingEventSender, DEFAULT_CHANNEL_BUFFER, booking_event_channel,
};
pub use types::BookingEvent;

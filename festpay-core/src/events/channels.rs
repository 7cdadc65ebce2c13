//! Event channel factories and handles.

use super::types::BookingEvent;
use tokio::sync::broadcast;

/// Default buffer size for event channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for BookingEvent events.
pub type BookingEventSender = broadcast::Sender<BookingEvent>;
/// Receiver handle for BookingEvent events.
pub type BookingEventReceiver = broadcast::Receiver<BookingEvent>;

/// Create a new BookingEvent channel.
///
/// Booking events fan out to every subscriber: call
/// [`subscribe`](broadcast::Sender::subscribe) on the sender for more
/// receivers. Sending without any live receiver is not an error for
/// producers, they ignore it.
pub fn booking_event_channel() -> (BookingEventSender, BookingEventReceiver) {
    broadcast::channel(DEFAULT_CHANNEL_BUFFER)
}

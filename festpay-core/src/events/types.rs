use festpay_sdk::objects::{BookingError, BookingReceipt};
use uuid::Uuid;

/// Outcome of one replay attempt for a queued request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingEvent {
    /// The backend confirmed the booking and the request left the queue.
    Booked {
        request_id: Uuid,
        receipt: BookingReceipt,
    },
    /// The attempt failed and the request stays queued for a later replay.
    Deferred {
        request_id: Uuid,
        attempts: u32,
        error: BookingError,
    },
    /// The backend rejected the request for a business reason and it was
    /// moved out of the replay set.
    Parked {
        request_id: Uuid,
        error: BookingError,
    },
}

impl BookingEvent {
    pub fn request_id(&self) -> Uuid {
        match self {
            BookingEvent::Booked { request_id, .. }
            | BookingEvent::Deferred { request_id, .. }
            | BookingEvent::Parked { request_id, .. } => *request_id,
        }
    }
}

//! Background processors.
//!
//! - `ReplayProcessor`: Watches the durable queue, books queued requests
//!   through a `BookingBackend`, emits `BookingEvent`

pub mod booking;
pub mod replay;

pub use booking::BookingBackend;
pub use replay::{
    RejectionPolicy, ReplayDecision, ReplayPolicy, ReplayProcessor, ReplayReport,
};

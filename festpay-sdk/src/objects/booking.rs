//! Booking API request and response types.
//!
//! A booking tells the backend that money has already changed hands at the
//! terminal. The backend applies it to the customer account identified by
//! the scanned tag, and must treat repeated submissions of the same
//! `request_id` as one logical booking.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the customer paid at the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Card => write!(f, "card"),
        }
    }
}

/// Request body for `POST /api/topup/book`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopUpBooking {
    /// Client-generated idempotency key.
    pub request_id: Uuid,
    pub customer_tag_uid: u64,
    pub amount: Decimal,
    pub tip: Decimal,
    pub payment_method: PaymentMethod,
}

/// What the backend said about a booking that was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingReceipt {
    /// The booking was applied by this call.
    Booked,
    /// A booking with the same request id had already been applied.
    AlreadyApplied,
}

/// Error body returned by the backend for rejected requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl ServiceErrorBody {
    pub const INSUFFICIENT_FUNDS: &str = "insufficient_funds";

    /// Convert the wire body into a typed business rejection.
    pub fn into_service_error(self) -> ServiceError {
        if self.kind == Self::INSUFFICIENT_FUNDS {
            ServiceError::InsufficientFunds
        } else {
            ServiceError::Generic(self.message.unwrap_or(self.kind))
        }
    }
}

/// Business-rule rejections reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("{0}")]
    Generic(String),
}

/// Every way a booking call can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    /// The terminal is not authorized (bad key, revoked terminal).
    #[error("access denied")]
    Access,
    /// The endpoint or the referenced customer does not exist.
    #[error("not found")]
    NotFound,
    /// The backend failed with a 5xx status.
    #[error("server error: status {0}")]
    Server(u16),
    /// The request never got a response (DNS, connect, timeout, TLS).
    #[error("request failed: {0}")]
    Request(String),
    /// The backend rejected the booking for a business reason.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

impl BookingError {
    /// Whether the failure is a rejection decided by backend business rules
    /// or authorization, as opposed to a transport or server fault.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            BookingError::Access | BookingError::NotFound | BookingError::Service(_)
        )
    }
}

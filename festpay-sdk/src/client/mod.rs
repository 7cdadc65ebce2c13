//! HTTP client for the festpay backend.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the shared types do not pull in `reqwest`.

mod booking;

pub use booking::{BookingClient, ClientTimeouts};

use reqwest::StatusCode;

use crate::objects::BookingError;

/// Errors produced by the SDK HTTP client outside of booking calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, timeout).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("api error: status {status}, body: {body}")]
    Api { status: StatusCode, body: String },

    /// Request or response body could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl From<ClientError> for BookingError {
    fn from(value: ClientError) -> Self {
        match value {
            ClientError::Http(e) => BookingError::Request(e.to_string()),
            ClientError::Api { status, .. } => BookingError::Server(status.as_u16()),
            ClientError::Json(e) => BookingError::Request(e.to_string()),
            ClientError::Url(e) => BookingError::Request(e.to_string()),
        }
    }
}

//! Booking API client (terminal -> backend).
//!
//! All requests are body-signed with the terminal key via [`SignedBody`];
//! bodiless requests sign the empty string.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use url::Url;

use super::ClientError;
use crate::objects::{
    BookingError, BookingReceipt, ServiceError, ServiceErrorBody, TerminalConfig, TopUpBooking,
};
use crate::signature::{KEY_ID_HEADER, SIGNATURE_HEADER, SignedBody};

const BOOK_TOP_UP_PATH: &str = "api/topup/book";
const TERMINAL_CONFIG_PATH: &str = "api/terminal/config";

/// Connect and whole-request timeouts for backend calls.
///
/// These bound how long a single replay attempt can stall on an
/// unreachable backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(3),
            request: Duration::from_secs(5),
        }
    }
}

/// Typed HTTP client for the backend **Booking API**.
#[derive(Debug, Clone)]
pub struct BookingClient {
    http: Client,
    base_url: Url,
    key_id: String,
    secret: Vec<u8>,
}

impl BookingClient {
    /// Create a new `BookingClient`.
    ///
    /// * `base_url` – root URL of the backend, endpoint paths are joined
    ///   relative to it.
    /// * `key_id` – identifier of the terminal key, sent in clear.
    /// * `secret` – the terminal HMAC secret shared with the backend.
    pub fn new(
        base_url: Url,
        key_id: impl Into<String>,
        secret: impl Into<Vec<u8>>,
        timeouts: ClientTimeouts,
    ) -> Result<Self, ClientError> {
        let http = Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()?;
        Ok(Self {
            http,
            base_url,
            key_id: key_id.into(),
            secret: secret.into(),
        })
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/topup/book` – book a top-up that was already paid at the
    /// terminal.
    ///
    /// Resubmitting the same `request_id` is safe: the backend answers 409
    /// for a booking it has already applied, which maps to
    /// [`BookingReceipt::AlreadyApplied`].
    pub async fn book_top_up(
        &self,
        booking: &TopUpBooking,
    ) -> Result<BookingReceipt, BookingError> {
        let url = self
            .base_url
            .join(BOOK_TOP_UP_PATH)
            .map_err(ClientError::from)?;
        let signed = SignedBody::sign(booking, &self.secret).map_err(ClientError::from)?;

        let resp = self
            .http
            .post(url)
            .header(KEY_ID_HEADER, &self.key_id)
            .header(SIGNATURE_HEADER, signed.to_header())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(signed.json)
            .send()
            .await
            .map_err(ClientError::from)?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        classify_booking_response(status, &body)
    }

    /// `GET /api/terminal/config` – fetch the registration of this terminal.
    ///
    /// Returns `Ok(None)` while the terminal is not registered (404).
    pub async fn fetch_terminal_config(&self) -> Result<Option<TerminalConfig>, ClientError> {
        let url = self.base_url.join(TERMINAL_CONFIG_PATH)?;
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let signed = SignedBody::sign_raw(String::new(), &self.secret, now);

        let resp = self
            .http
            .get(url)
            .header(KEY_ID_HEADER, &self.key_id)
            .header(SIGNATURE_HEADER, signed.to_header())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        parse_terminal_config_response(status, body)
    }
}

/// Map a terminal config response: 404 means not registered yet.
pub(crate) fn parse_terminal_config_response(
    status: StatusCode,
    body: String,
) -> Result<Option<TerminalConfig>, ClientError> {
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(ClientError::Api { status, body });
    }
    Ok(Some(serde_json::from_str(&body)?))
}

/// Map a booking response onto the booking result taxonomy.
pub(crate) fn classify_booking_response(
    status: StatusCode,
    body: &str,
) -> Result<BookingReceipt, BookingError> {
    match status {
        s if s.is_success() => Ok(BookingReceipt::Booked),
        StatusCode::CONFLICT => Ok(BookingReceipt::AlreadyApplied),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BookingError::Access),
        StatusCode::NOT_FOUND => Err(BookingError::NotFound),
        StatusCode::REQUEST_TIMEOUT => Err(BookingError::Request(status.to_string())),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            let error = match serde_json::from_str::<ServiceErrorBody>(body) {
                Ok(parsed) => parsed.into_service_error(),
                Err(_) if body.is_empty() => ServiceError::Generic(status.to_string()),
                Err(_) => ServiceError::Generic(body.to_string()),
            };
            Err(BookingError::Service(error))
        }
        // 5xx, 429 and anything unexpected are retried like server faults.
        s => Err(BookingError::Server(s.as_u16())),
    }
}

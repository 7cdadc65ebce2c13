//! Request signing for the terminal -> backend API.
//!
//! Every booking and config request carries an HMAC-SHA256 signature over
//! the exact JSON body that was sent. The wire format for the header is:
//!
//! ```text
//! Festpay-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! and the signed data is `"{timestamp}.{json_body}"`. Requests without a
//! body sign the empty string.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "Festpay-Signature";

/// Header name identifying which terminal key signed the request.
pub const KEY_ID_HEADER: &str = "Festpay-Key-Id";

/// Maximum allowed age of a signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

/// A serialized request body together with its timestamp and signature.
///
/// The JSON string is kept verbatim: the signature covers these bytes, so
/// the body must be sent exactly as stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBody {
    pub timestamp: i64,
    pub json: String,
    pub signature: Box<[u8]>,
}

impl SignedBody {
    /// Serialize `body` and sign it with the current time.
    pub fn sign<T: Serialize>(body: &T, key: &[u8]) -> Result<Self, serde_json::Error> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        Self::sign_at(body, key, now)
    }

    /// Serialize `body` and sign it with an explicit timestamp.
    pub fn sign_at<T: Serialize>(
        body: &T,
        key: &[u8],
        timestamp: i64,
    ) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(body)?;
        Ok(Self::sign_raw(json, key, timestamp))
    }

    /// Sign an already serialized body (or the empty string for `GET`s).
    pub fn sign_raw(json: String, key: &[u8], timestamp: i64) -> Self {
        let tag = ring::hmac::sign(&hmac_key(key), signed_data(timestamp, &json).as_bytes());
        Self {
            timestamp,
            json,
            signature: tag.as_ref().to_owned().into_boxed_slice(),
        }
    }

    /// Reassemble a signed body from a received header value and body string.
    ///
    /// This only parses; call [`verify`](Self::verify) to check the HMAC.
    pub fn from_header(header_value: &str, json: String) -> Result<Self, SignatureError> {
        let (timestamp, signature) = parse_signature_header(header_value)?;
        Ok(Self {
            timestamp,
            json,
            signature,
        })
    }

    /// Verify the HMAC and the timestamp freshness against the current time.
    pub fn verify(&self, key: &[u8]) -> Result<(), SignatureError> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        self.verify_at(key, now)
    }

    /// Verify the HMAC and freshness against an explicit `now`.
    pub fn verify_at(&self, key: &[u8], now: i64) -> Result<(), SignatureError> {
        ring::hmac::verify(
            &hmac_key(key),
            signed_data(self.timestamp, &self.json).as_bytes(),
            &self.signature,
        )?;
        if now - self.timestamp > MAX_SIGNATURE_AGE {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }

    /// Deserialize the signed JSON body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SignatureError> {
        Ok(serde_json::from_str(&self.json)?)
    }

    /// Format the full `Festpay-Signature` header value.
    pub fn to_header(&self) -> String {
        format_signature_header(self.timestamp, &self.signature)
    }
}

fn hmac_key(key: &[u8]) -> ring::hmac::Key {
    ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key)
}

fn signed_data(timestamp: i64, json: &str) -> String {
    format!("{timestamp}.{json}")
}

/// Parse a `{timestamp}.{base64}` header value into its parts.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, encoded) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature = fast32::base64::RFC4648_NOPAD
        .decode_str(encoded)
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature))
}

/// Format a `{timestamp}.{base64}` header value from its parts.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

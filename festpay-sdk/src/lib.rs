#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

//! Shared types for festpay terminals and the festpay backend.
//!
//! - [`objects`]: booking and terminal registration payloads
//! - [`signature`]: HMAC request signing
//! - `client` (feature `client`): typed HTTP client for the booking API

pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;

//! Boundary to the vendor card reader SDK.
//!
//! The SDK works by launching screens that report back asynchronously with an
//! activity result on a numeric request code. Launch calls return as soon as
//! the screen is up, the result arrives later through
//! [`CallbackRouter::deliver`](super::CallbackRouter::deliver).

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use uuid::Uuid;

/// Request codes the SDK screens report back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackChannel {
    Login,
    Payment,
    Settings,
}

impl CallbackChannel {
    pub const fn code(self) -> i32 {
        match self {
            CallbackChannel::Login => 4101,
            CallbackChannel::Payment => 4102,
            CallbackChannel::Settings => 4103,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            4101 => Some(CallbackChannel::Login),
            4102 => Some(CallbackChannel::Payment),
            4103 => Some(CallbackChannel::Settings),
            _ => None,
        }
    }
}

/// Platform result code of a finished SDK screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityCode {
    Ok,
    Canceled,
    Other(i32),
}

impl ActivityCode {
    pub const RAW_OK: i32 = -1;
    pub const RAW_CANCELED: i32 = 0;

    pub fn from_raw(code: i32) -> Self {
        match code {
            Self::RAW_OK => ActivityCode::Ok,
            Self::RAW_CANCELED => ActivityCode::Canceled,
            other => ActivityCode::Other(other),
        }
    }
}

/// Checkout specific data attached to a payment screen result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPayload {
    pub result_code: i32,
    pub token: Option<String>,
    pub message: Option<String>,
}

impl CheckoutPayload {
    pub const SUCCESS: i32 = 1;

    pub fn is_success(&self) -> bool {
        self.result_code == Self::SUCCESS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityResult {
    pub code: ActivityCode,
    pub payload: Option<CheckoutPayload>,
}

impl ActivityResult {
    pub fn ok() -> Self {
        Self {
            code: ActivityCode::Ok,
            payload: None,
        }
    }

    pub fn canceled() -> Self {
        Self {
            code: ActivityCode::Canceled,
            payload: None,
        }
    }
}

/// Parameters of one card checkout screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub amount: Decimal,
    pub tip: Decimal,
    pub currency: String,
    pub title: String,
    /// Id of the payment request, echoed in the card processor's records.
    pub foreign_transaction_id: Uuid,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdkError {
    #[error("card reader is not available: {0}")]
    Unavailable(String),
    #[error("card SDK refused to launch: {0}")]
    Launch(String),
    #[error("card SDK screen ended with {0:?}")]
    Result(ActivityCode),
    #[error("card SDK result was never delivered")]
    Abandoned,
}

/// The vendor SDK surface used by the gateway.
pub trait CardSdk: Send + Sync {
    fn is_logged_in(&self) -> bool;
    fn launch_login(&self, channel: CallbackChannel) -> Result<(), SdkError>;
    fn launch_checkout(&self, checkout: &Checkout, channel: CallbackChannel)
    -> Result<(), SdkError>;
    fn launch_settings(&self, channel: CallbackChannel) -> Result<(), SdkError>;
}

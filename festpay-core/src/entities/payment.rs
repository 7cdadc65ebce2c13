use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tag::TagIdentity;
use festpay_sdk::objects::TopUpBooking;

pub use festpay_sdk::objects::PaymentMethod;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount must be greater than zero, got {0}")]
    NotPositive(Decimal),
    #[error("tip must not be negative, got {0}")]
    NegativeTip(Decimal),
}

/// A strictly positive monetary amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One customer payment at the terminal.
///
/// The id is generated once, at construction, and is the idempotency key of
/// every booking attempt for this payment. Requests are immutable: retrying a
/// card payment or replaying a queued booking reuses the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    id: Uuid,
    tag: TagIdentity,
    amount: Amount,
    tip: Decimal,
    method: PaymentMethod,
}

impl PaymentRequest {
    pub fn new(
        tag: TagIdentity,
        amount: Amount,
        tip: Decimal,
        method: PaymentMethod,
    ) -> Result<Self, AmountError> {
        if tip < Decimal::ZERO {
            return Err(AmountError::NegativeTip(tip));
        }
        Ok(Self {
            id: Uuid::now_v7(),
            tag,
            amount,
            tip,
            method,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tag(&self) -> &TagIdentity {
        &self.tag
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn tip(&self) -> Decimal {
        self.tip
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    /// Amount plus tip, the sum actually charged to the customer.
    pub fn total(&self) -> Decimal {
        self.amount.value() + self.tip
    }

    pub fn to_top_up_booking(&self) -> TopUpBooking {
        TopUpBooking {
            request_id: self.id,
            customer_tag_uid: self.tag.uid(),
            amount: self.amount.value(),
            tip: self.tip,
            payment_method: self.method,
        }
    }
}

pub mod payment;
pub mod pending_request;
pub mod tag;

pub use payment::{Amount, AmountError, PaymentMethod, PaymentRequest};
pub use pending_request::{QueuedRequest, RequestKind};
pub use tag::TagIdentity;

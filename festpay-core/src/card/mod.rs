//! Card payments through the vendor card reader SDK.

pub mod callbacks;
pub mod gateway;
pub mod sdk;

pub use callbacks::CallbackRouter;
pub use gateway::{
    CardPaymentGateway, CardPaymentState, CardSettings, PAYMENT_IN_PROGRESS,
    TERMINAL_CONFIG_MISSING,
};
pub use sdk::{
    ActivityCode, ActivityResult, CallbackChannel, CardSdk, Checkout, CheckoutPayload, SdkError,
};

use async_trait::async_trait;
use festpay_sdk::client::BookingClient;
use festpay_sdk::objects::{BookingError, BookingReceipt};

use crate::entities::{PaymentRequest, RequestKind};

/// The backend call that books a queued request.
#[async_trait]
pub trait BookingBackend: Send + Sync {
    async fn book(
        &self,
        kind: RequestKind,
        request: &PaymentRequest,
    ) -> Result<BookingReceipt, BookingError>;
}

#[async_trait]
impl BookingBackend for BookingClient {
    async fn book(
        &self,
        kind: RequestKind,
        request: &PaymentRequest,
    ) -> Result<BookingReceipt, BookingError> {
        match kind {
            RequestKind::TopUp => self.book_top_up(&request.to_top_up_booking()).await,
        }
    }
}

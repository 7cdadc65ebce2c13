pub mod booking;
pub mod terminal;

pub use booking::{
    BookingError, BookingReceipt, PaymentMethod, ServiceError,
    ServiceErrorBody, TopUpBooking,
};
pub use terminal::TerminalConfig;

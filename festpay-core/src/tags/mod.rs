//! Customer tag scanning.

pub mod session;
pub mod validator;

pub use session::{ScanOptions, ScanSession, ScanSessionError, ScanState};
pub use validator::{
    DEFAULT_CONTENT_MARKER, RawTag, ScanOutcome, TagReadError, TagReader, TagValidator,
};

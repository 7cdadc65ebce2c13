//! Single-shot tag validation.
//!
//! A scan reads the raw tag through a [`TagReader`] and checks that it was
//! provisioned for this festival: the uid must be non-zero and the stored
//! content must start with the provisioning marker. Everything after the
//! marker is handed on as the tag payload.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::entities::TagIdentity;

/// Marker written at the start of every provisioned tag.
pub const DEFAULT_CONTENT_MARKER: &[u8] = b"festpay-tag-v1";

/// What the reader hardware returned for a tag in the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTag {
    pub uid: u64,
    pub content: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagReadError {
    /// The tag technology is not one the reader can talk to.
    #[error("tag type is not supported")]
    Incompatible,
    /// The tag refused our keys.
    #[error("tag authentication failed")]
    AuthenticationFailed,
    /// The tag left the field before the read finished.
    #[error("tag left the field")]
    TagLost,
    /// The terminal has no key material to authenticate tags.
    #[error("tag key material is missing")]
    NoKey,
    #[error("tag i/o error: {0}")]
    Io(String),
}

/// Hardware access to the NFC reader.
///
/// `read` waits for the next tag to enter the field and reads it.
#[async_trait]
pub trait TagReader: Send + Sync {
    async fn read(&self) -> Result<RawTag, TagReadError>;
}

/// Result of one scan attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Success(TagIdentity),
    /// Unsupported tag technology.
    Incompatible,
    /// The tag is readable but was not provisioned by us, or was altered.
    Tampered,
    /// Transient failure, present the tag again.
    Rescan,
    /// No key material on the terminal, scanning cannot succeed.
    NoKey,
    /// Any other reader failure, treated as transient.
    Other(String),
}

impl ScanOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ScanOutcome::Success(_))
    }

    /// A tag was read and refused.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ScanOutcome::Incompatible | ScanOutcome::Tampered)
    }

    /// Scanning should simply continue.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScanOutcome::Rescan | ScanOutcome::Other(_))
    }
}

impl From<TagReadError> for ScanOutcome {
    fn from(value: TagReadError) -> Self {
        match value {
            TagReadError::Incompatible => ScanOutcome::Incompatible,
            TagReadError::AuthenticationFailed => ScanOutcome::Tampered,
            TagReadError::TagLost => ScanOutcome::Rescan,
            TagReadError::NoKey => ScanOutcome::NoKey,
            TagReadError::Io(message) => ScanOutcome::Other(message),
        }
    }
}

pub struct TagValidator {
    reader: Arc<dyn TagReader>,
    marker: Bytes,
}

impl TagValidator {
    pub fn new(reader: Arc<dyn TagReader>) -> Self {
        Self {
            reader,
            marker: Bytes::from_static(DEFAULT_CONTENT_MARKER),
        }
    }

    /// Use a different provisioning marker.
    pub fn with_marker(mut self, marker: impl Into<Bytes>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Read one tag and classify it.
    pub async fn scan(&self) -> ScanOutcome {
        match self.reader.read().await {
            Ok(raw) => self.validate(raw),
            Err(e) => {
                tracing::debug!(error = %e, "Tag read failed");
                e.into()
            }
        }
    }

    fn validate(&self, raw: RawTag) -> ScanOutcome {
        if raw.uid == 0 || !raw.content.starts_with(&self.marker) {
            tracing::warn!(uid = raw.uid, "Tag is not provisioned for this terminal");
            return ScanOutcome::Tampered;
        }
        let payload = raw.content.slice(self.marker.len()..);
        let payload = (!payload.is_empty()).then_some(payload);
        ScanOutcome::Success(TagIdentity::new(raw.uid, payload))
    }
}

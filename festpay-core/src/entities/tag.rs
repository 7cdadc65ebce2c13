use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identity of a customer tag, decoded from a validated scan.
///
/// Only [`TagValidator`](crate::tags::TagValidator) creates these: customer
/// facing flows can never turn user input into a tag identity. It is
/// serializable so that queued requests can be reloaded from storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagIdentity {
    uid: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Bytes>,
}

impl TagIdentity {
    pub(crate) fn new(uid: u64, payload: Option<Bytes>) -> Self {
        Self { uid, payload }
    }

    /// The numeric chip identifier the backend knows the account by.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Content stored on the tag after the provisioning marker, if any.
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }
}

impl std::fmt::Display for TagIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:014X}", self.uid)
    }
}

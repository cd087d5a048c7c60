//! Delta records.
//!
//! A delta is one already-serialized incremental update. The log never looks
//! inside it; identity is its position in whatever log holds it.

use bytes::Bytes;

/// One opaque, immutable update record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Delta(Bytes);

impl Delta {
    /// Wrap serialized bytes
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Raw serialized bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Shared handle to the payload
    #[must_use]
    pub fn payload(&self) -> Bytes {
        self.0.clone()
    }

    /// Payload length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Delta {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&'static [u8]> for Delta {
    fn from(value: &'static [u8]) -> Self {
        Self(Bytes::from_static(value))
    }
}

impl From<Bytes> for Delta {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for Delta {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

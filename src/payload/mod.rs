use std::borrow::Cow;
use std::fmt::{Debug, Formatter};
use bytes::Bytes;

mod assembler;

pub use assembler::PayloadAssembler;

/// The application-visible unit of a request or response: data and (optional) metadata.
///
/// `metadata` is `Some` iff the frame carrying the payload has its METADATA flag set, so
///  `Some(Bytes::new())` (metadata present but empty) is different from `None`.
///
/// The buffers are reference counted [Bytes]. Payloads are moved (not shared) between the
///  application, the codec and the assembler, and the memory is released when the last owner
///  drops it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub data: Bytes,
    pub metadata: Option<Bytes>,
}

impl Payload {
    pub fn new(data: impl Into<Bytes>, metadata: Option<Bytes>) -> Payload {
        Payload {
            data: data.into(),
            metadata,
        }
    }

    pub fn from_data(data: impl Into<Bytes>) -> Payload {
        Payload::new(data, None)
    }

    pub fn with_metadata(data: impl Into<Bytes>, metadata: impl Into<Bytes>) -> Payload {
        Payload::new(data, Some(metadata.into()))
    }

    pub fn empty() -> Payload {
        Payload::default()
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn data_utf8(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.data)
    }

    pub fn metadata_utf8(&self) -> Option<Cow<str>> {
        self.metadata.as_ref()
            .map(|m| String::from_utf8_lossy(m))
    }
}

impl Debug for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.metadata {
            None => write!(f, "Payload[data: {} bytes]", self.data.len()),
            Some(metadata) => write!(f, "Payload[data: {} bytes, metadata: {} bytes]", self.data.len(), metadata.len()),
        }
    }
}

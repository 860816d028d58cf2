use bytes::{BufMut, BytesMut};
use tracing::trace;
use crate::payload::Payload;

/// Collects the fragments of a payload that was split across several frames (FOLLOWS flag set
///  on all but the last one).
#[derive(Default)]
pub struct PayloadAssembler {
    data: BytesMut,
    metadata: Option<BytesMut>,
    num_fragments: usize,
}

impl PayloadAssembler {
    pub fn new() -> PayloadAssembler {
        Default::default()
    }

    pub fn has_payload(&self) -> bool {
        self.num_fragments > 0
    }

    pub fn append_fragment(&mut self, fragment: Payload) {
        trace!("appending fragment #{}: {:?}", self.num_fragments, fragment);
        self.num_fragments += 1;

        self.data.put_slice(&fragment.data);
        if let Some(metadata) = fragment.metadata {
            self.metadata
                .get_or_insert_with(BytesMut::new)
                .put_slice(&metadata);
        }
    }

    /// Combines previously appended fragments with the final fragment. If there were no previous
    ///  fragments, the final fragment is returned as is without copying.
    pub fn assemble_payload(&mut self, last_fragment: Payload) -> Payload {
        if !self.has_payload() {
            return last_fragment;
        }

        self.append_fragment(last_fragment);
        trace!("assembled payload from {} fragments", self.num_fragments);

        self.num_fragments = 0;
        Payload {
            data: self.data.split().freeze(),
            metadata: self.metadata.take().map(|m| m.freeze()),
        }
    }

    /// Discards buffered fragments, e.g. when the owning operation is aborted
    pub fn clear(&mut self) {
        if self.has_payload() {
            trace!("discarding {} buffered fragments", self.num_fragments);
        }
        self.num_fragments = 0;
        self.data.clear();
        self.metadata = None;
    }
}

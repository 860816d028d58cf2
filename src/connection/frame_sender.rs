use std::sync::Arc;
use tracing::{trace, warn};
use crate::buffer_pool::BufferPool;
use crate::connection::prioritizer::Prioritizer;
use crate::error::RSocketError;
use crate::frame::Frame;

/// Encodes frames into pooled buffers and hands them to the connection's prioritizer. This is
///  the only way anything in a connection sends frames; cloning is cheap.
#[derive(Clone)]
pub struct FrameSender {
    prioritizer: Prioritizer,
    buffer_pool: Arc<BufferPool>,
    max_fragment_size: usize,
}

impl FrameSender {
    pub fn new(prioritizer: Prioritizer, buffer_pool: Arc<BufferPool>, max_fragment_size: usize) -> FrameSender {
        FrameSender {
            prioritizer,
            buffer_pool,
            max_fragment_size,
        }
    }

    /// The maximum size of an encoded frame including its length prefix, 0 for 'no limit'
    pub fn max_fragment_size(&self) -> usize {
        self.max_fragment_size
    }

    pub async fn send_frame(&self, frame: Frame) -> Result<(), RSocketError> {
        let mut buf = self.buffer_pool.get_from_pool();
        if let Err(e) = frame.ser(&mut buf) {
            warn!("failed to encode {}: {}", frame, e);
            self.buffer_pool.return_to_pool(buf);
            return Err(RSocketError::Invalid(format!("{:#}", e)));
        }

        trace!("sending {}", frame);
        self.prioritizer.enqueue_frame(frame.stream_id, buf).await
    }
}

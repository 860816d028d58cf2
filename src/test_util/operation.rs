use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use crate::buffer_pool::BufferPool;
use crate::connection::prioritizer::{prioritizer, PrioritizerQueue};
use crate::connection::FrameSender;
use crate::frame::Frame;
use crate::operation::OperationOutbound;

/// An [OperationOutbound] whose frames end up in the returned [CapturedFrames] instead of a
///  transport. Dropping the [CapturedFrames] closes the 'connection'.
pub fn test_outbound(stream_id: u32, max_fragment_size: usize) -> (OperationOutbound, CapturedFrames) {
    let (prioritizer, queue) = prioritizer(64);
    let sender = FrameSender::new(prioritizer, Arc::new(BufferPool::new(256, 8)), max_fragment_size);
    (OperationOutbound::new(stream_id, sender), CapturedFrames { queue })
}

pub struct CapturedFrames {
    queue: PrioritizerQueue,
}

impl CapturedFrames {
    /// Waits for the next frame, failing the test if none arrives
    pub async fn next_frame(&mut self) -> Frame {
        let buf = time::timeout(Duration::from_secs(5), self.queue.dequeue_frame()).await
            .expect("no frame was sent")
            .expect("frame queue is closed");
        Frame::deser(&mut buf.freeze()).expect("sent frame can not be decoded")
    }

    /// Checks for frames that were sent already, without waiting
    pub fn is_empty(&mut self) -> bool {
        self.queue.try_dequeue_frame().is_none()
    }
}

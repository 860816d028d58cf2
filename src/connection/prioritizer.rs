use bytes::BytesMut;
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use crate::error::RSocketError;

/// Creates the queue of encoded frames between all producers of a connection (operations,
///  keep-alive, the receive loop) and its send loop.
///
/// There are two bounded lanes: connection-level frames (stream 0) and stream frames. The send
///  loop always drains the connection lane first, so keep-alive and connection errors are never
///  stuck behind a backlog of stream frames. Each lane is FIFO, so frames of a stream keep their
///  order.
pub fn prioritizer(capacity: usize) -> (Prioritizer, PrioritizerQueue) {
    let (control_tx, control_rx) = mpsc::channel(capacity);
    let (streams_tx, streams_rx) = mpsc::channel(capacity);

    (
        Prioritizer {
            control: control_tx,
            streams: streams_tx,
        },
        PrioritizerQueue {
            control: control_rx,
            streams: streams_rx,
        },
    )
}

#[derive(Clone)]
pub struct Prioritizer {
    control: mpsc::Sender<BytesMut>,
    streams: mpsc::Sender<BytesMut>,
}

impl Prioritizer {
    /// Waits for room in the frame's lane. Fails after the queue was closed, dropping the frame.
    pub async fn enqueue_frame(&self, stream_id: u32, frame: BytesMut) -> Result<(), RSocketError> {
        let lane = if stream_id == 0 {
            &self.control
        }
        else {
            &self.streams
        };

        lane.send(frame).await
            .map_err(|_| RSocketError::connection_closed())
    }
}

pub struct PrioritizerQueue {
    control: mpsc::Receiver<BytesMut>,
    streams: mpsc::Receiver<BytesMut>,
}

impl PrioritizerQueue {
    /// Returns `None` when all producers are gone, or after [PrioritizerQueue::close]. Cancel safe.
    pub async fn dequeue_frame(&mut self) -> Option<BytesMut> {
        select! {
            biased;
            Some(frame) = self.control.recv() => {
                trace!("dequeued connection frame");
                Some(frame)
            }
            Some(frame) = self.streams.recv() => Some(frame),
            else => None,
        }
    }

    #[cfg(test)]
    pub fn try_dequeue_frame(&mut self) -> Option<BytesMut> {
        self.control.try_recv()
            .or_else(|_| self.streams.try_recv())
            .ok()
    }

    /// Rejects further frames and drops the ones that are still queued. Returns the number of
    ///  dropped frames.
    pub fn close(&mut self) -> usize {
        self.control.close();
        self.streams.close();

        let mut num_dropped = 0;
        while self.control.try_recv().is_ok() {
            num_dropped += 1;
        }
        while self.streams.try_recv().is_ok() {
            num_dropped += 1;
        }
        if num_dropped > 0 {
            debug!("dropped {} queued frames on close", num_dropped);
        }
        num_dropped
    }
}

use std::sync::{Arc, Mutex};
use anyhow::bail;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};
use crate::error::RSocketError;
use crate::frame::{Frame, FrameBody};
use crate::operation::{OperationFrameHandler, OperationInbound};
use crate::stream_id::StreamIdAllocator;

/// What [StreamsStorage::dispatch] did with a frame
#[derive(Debug)]
pub enum Dispatch {
    Delivered,
    /// the frame belongs to a stream that is finished already
    Dropped,
    /// the frame opens a new stream initiated by the peer
    NewStream(Frame),
}

/// The table of live streams of a connection, for both locally and peer initiated streams
pub struct StreamsStorage {
    allocator: StreamIdAllocator,
    inner: Mutex<StorageInner>,
}

struct StorageInner {
    streams: FxHashMap<u32, Arc<OperationFrameHandler>>,
    highest_peer_stream_id: u32,
    /// set by [StreamsStorage::cleanup], no streams can be added after that
    closed: Option<RSocketError>,
}

impl StreamsStorage {
    pub fn new(is_client: bool) -> StreamsStorage {
        StreamsStorage {
            allocator: StreamIdAllocator::for_role(is_client),
            inner: Mutex::new(StorageInner {
                streams: FxHashMap::default(),
                highest_peer_stream_id: 0,
                closed: None,
            }),
        }
    }

    /// Registers a locally initiated stream under a newly allocated id
    pub fn create_stream(&self, inbound: Arc<dyn OperationInbound>) -> Result<u32, RSocketError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cause) = &inner.closed {
            return Err(cause.clone());
        }

        let stream_id = self.allocator.next(|id| inner.streams.contains_key(&id));
        inner.streams.insert(stream_id, Arc::new(OperationFrameHandler::new(inbound)));
        debug!("stream {}: created", stream_id);
        Ok(stream_id)
    }

    /// Registers a stream initiated by the peer
    pub fn accept_stream(&self, stream_id: u32, inbound: Arc<dyn OperationInbound>) -> anyhow::Result<()> {
        if self.allocator.is_own_id(stream_id) {
            bail!("stream {}: the peer can not initiate a stream with this id", stream_id);
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(cause) = &inner.closed {
            bail!("connection is closed: {}", cause);
        }
        if inner.streams.contains_key(&stream_id) {
            bail!("stream {}: duplicate stream id", stream_id);
        }

        inner.streams.insert(stream_id, Arc::new(OperationFrameHandler::new(inbound)));
        inner.highest_peer_stream_id = inner.highest_peer_stream_id.max(stream_id);
        debug!("stream {}: accepted", stream_id);
        Ok(())
    }

    /// Marks a peer initiated stream id as used without registering a stream, e.g. for a
    ///  request that is still being reassembled or that was rejected
    pub fn reserve_peer_stream_id(&self, stream_id: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.highest_peer_stream_id = inner.highest_peer_stream_id.max(stream_id);
    }

    /// Routes a frame (stream id != 0) to its stream. An `Err` is a protocol violation.
    pub fn dispatch(&self, frame: Frame) -> anyhow::Result<Dispatch> {
        let stream_id = frame.stream_id;
        let is_request = matches!(&frame.body, FrameBody::Request(r) if r.frame_type.is_request());

        let handler = {
            let inner = self.inner.lock().unwrap();
            match inner.streams.get(&stream_id) {
                Some(handler) => {
                    if is_request {
                        bail!("stream {}: request for a stream id that is in use", stream_id);
                    }
                    handler.clone()
                }
                None => {
                    if self.allocator.is_own_id(stream_id) {
                        if self.allocator.is_before_or_current(stream_id) {
                            trace!("stream {}: dropping {} for a finished stream", stream_id, frame.frame_type().name());
                            return Ok(Dispatch::Dropped);
                        }
                        bail!("stream {}: {} for a stream that was never created", stream_id, frame.frame_type().name());
                    }

                    if is_request && stream_id > inner.highest_peer_stream_id {
                        return Ok(Dispatch::NewStream(frame));
                    }
                    if stream_id <= inner.highest_peer_stream_id {
                        trace!("stream {}: dropping {} for a finished stream", stream_id, frame.frame_type().name());
                        return Ok(Dispatch::Dropped);
                    }
                    bail!("stream {}: {} for a stream that was never created", stream_id, frame.frame_type().name());
                }
            }
        };

        // outside the lock: operations may create or remove streams
        handler.handle_frame(frame)?;
        Ok(Dispatch::Delivered)
    }

    pub fn remove(&self, stream_id: u32) {
        let removed = self.inner.lock().unwrap().streams.remove(&stream_id);
        if let Some(handler) = removed {
            debug!("stream {}: removed", stream_id);
            handler.handle_done();
        }
    }

    /// Fails all streams with `cause` and rejects new streams. Returns the number of failed
    ///  streams.
    pub fn cleanup(&self, cause: RSocketError) -> usize {
        let handlers: Vec<_> = {
            let mut inner = self.inner.lock().unwrap();
            inner.closed = Some(cause.clone());
            inner.streams.drain().collect()
        };

        for (stream_id, handler) in &handlers {
            trace!("stream {}: failing because the connection is closed", stream_id);
            handler.operation_failure(cause.clone());
        }
        if !handlers.is_empty() {
            debug!("failed {} streams: {}", handlers.len(), cause);
        }
        handlers.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, stream_id: u32) -> bool {
        self.inner.lock().unwrap().streams.contains_key(&stream_id)
    }
}

use std::cmp::min;
use bytes::Bytes;
use tracing::{debug, trace};
use crate::connection::FrameSender;
use crate::error::RSocketError;
use crate::limiter::Limiter;
use crate::streams::PayloadStream;
use crate::frame::{length_prefix, Frame, FrameBody, FrameType, RequestFrame, HEADER_SIZE, METADATA_LENGTH_SIZE};
use crate::payload::Payload;

/// fixed overhead of every fragment: length prefix and frame header
const FRAGMENT_OFFSET: usize = length_prefix::LENGTH_PREFIX_SIZE + HEADER_SIZE;
const INITIAL_REQUEST_SIZE: usize = 4;

/// The sending side of an operation, bound to its stream id
#[derive(Clone)]
pub struct OperationOutbound {
    stream_id: u32,
    sender: FrameSender,
}

impl OperationOutbound {
    pub fn new(stream_id: u32, sender: FrameSender) -> OperationOutbound {
        OperationOutbound { stream_id, sender }
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Sends the frame(s) opening a stream
    pub async fn send_request(&self, frame_type: FrameType, payload: Payload, complete: bool, initial_request: u32) -> Result<(), RSocketError> {
        debug!("stream {}: sending {}", self.stream_id, frame_type.name());
        self.send_fragmented(frame_type, payload, complete, initial_request).await
    }

    /// Sends a payload as PAYLOAD frame(s) with NEXT, and COMPLETE if requested
    pub async fn send_next(&self, payload: Payload, complete: bool) -> Result<(), RSocketError> {
        self.send_fragmented(FrameType::Payload, payload, complete, 0).await
    }

    pub async fn send_complete(&self) -> Result<(), RSocketError> {
        trace!("stream {}: sending COMPLETE", self.stream_id);
        self.sender.send_frame(Frame::payload(self.stream_id, Payload::empty(), false, true)).await
    }

    pub async fn send_error(&self, error: &RSocketError) -> Result<(), RSocketError> {
        debug!("stream {}: sending ERROR {}", self.stream_id, error);
        self.sender.send_frame(Frame::error(self.stream_id, error)).await
    }

    pub async fn send_cancel(&self) -> Result<(), RSocketError> {
        debug!("stream {}: sending CANCEL", self.stream_id);
        self.sender.send_frame(Frame::cancel(self.stream_id)).await
    }

    pub async fn send_request_n(&self, n: u32) -> Result<(), RSocketError> {
        trace!("stream {}: sending REQUEST_N {}", self.stream_id, n);
        self.sender.send_frame(Frame::request_n(self.stream_id, n)).await
    }

    /// Sends the items of `payloads` as they become available and credit permits, followed by
    ///  COMPLETE, or by ERROR if the sequence fails. Returns the sequence's error in the latter case.
    ///
    /// An item is taken from the sequence before waiting for credit, so the end of the sequence is
    ///  signalled even without outstanding credit.
    pub async fn send_payloads(&self, limiter: &Limiter, mut payloads: PayloadStream) -> Result<(), RSocketError> {
        loop {
            match payloads.next().await {
                Some(Ok(payload)) => {
                    limiter.use_request().await;
                    self.send_next(payload, false).await?;
                }
                Some(Err(e)) => {
                    let e = e.for_stream();
                    self.send_error(&e).await?;
                    return Err(e);
                }
                None => return self.send_complete().await,
            }
        }
    }

    async fn send_fragmented(&self, frame_type: FrameType, payload: Payload, complete: bool, initial_request: u32) -> Result<(), RSocketError> {
        let frames = fragment_payload(self.stream_id, frame_type, payload, complete, initial_request, self.sender.max_fragment_size());
        if frames.len() > 1 {
            debug!("stream {}: sending payload in {} fragments", self.stream_id, frames.len());
        }
        for frame in frames {
            self.sender.send_frame(frame).await?;
        }
        Ok(())
    }
}

fn is_fragmentable(max_fragment_size: usize, payload: &Payload, has_initial_request: bool) -> bool {
    if max_fragment_size == 0 {
        return false;
    }

    let mut overhead = FRAGMENT_OFFSET;
    if has_initial_request {
        overhead += INITIAL_REQUEST_SIZE;
    }
    let mut payload_len = payload.data.len();
    if let Some(metadata) = &payload.metadata {
        overhead += METADATA_LENGTH_SIZE;
        payload_len += metadata.len();
    }
    payload_len + overhead > max_fragment_size
}

/// Splits a payload into frames that each fit into `max_fragment_size` bytes (including the
///  length prefix), or returns a single frame if it fits or fragmentation is disabled (0).
///
/// The first frame has `frame_type` and carries the initial request count, subsequent frames are
///  PAYLOAD frames with NEXT. Metadata is sent before data, all frames but the last have FOLLOWS.
///  COMPLETE is set on the last frame only.
///
/// `max_fragment_size` must leave room for at least one byte of payload.
pub fn fragment_payload(stream_id: u32, frame_type: FrameType, payload: Payload, complete: bool, initial_request: u32, max_fragment_size: usize) -> Vec<Frame> {
    let has_initial_request = frame_type.has_initial_request();
    let first_next = frame_type == FrameType::Payload;

    if !is_fragmentable(max_fragment_size, &payload, has_initial_request) {
        return vec![Frame::new(stream_id, FrameBody::Request(RequestFrame {
            frame_type,
            follows: false,
            complete,
            next: first_next,
            initial_request,
            payload,
        }))];
    }

    let mut fragment_size = max_fragment_size - FRAGMENT_OFFSET;
    if has_initial_request {
        fragment_size -= INITIAL_REQUEST_SIZE;
    }

    let Payload { mut data, mut metadata } = payload;
    let mut frames = Vec::new();
    let mut is_first = true;

    loop {
        let mut remaining = fragment_size;

        // metadata presence is preserved on the first fragment even if it is empty
        let metadata_fragment = match &mut metadata {
            Some(m) if is_first || !m.is_empty() => {
                remaining -= METADATA_LENGTH_SIZE;
                let len = min(m.len(), remaining);
                remaining -= len;
                Some(m.split_to(len))
            }
            _ => None,
        };

        let data_fragment = if remaining > 0 {
            data.split_to(min(data.len(), remaining))
        }
        else {
            Bytes::new()
        };

        let follows = metadata.as_ref().is_some_and(|m| !m.is_empty()) || !data.is_empty();

        frames.push(Frame::new(stream_id, FrameBody::Request(RequestFrame {
            frame_type: if is_first { frame_type } else { FrameType::Payload },
            follows,
            complete: complete && !follows,
            next: if is_first { first_next } else { true },
            initial_request: if is_first { initial_request } else { 0 },
            payload: Payload {
                data: data_fragment,
                metadata: metadata_fragment,
            },
        })));

        if !follows {
            break;
        }
        is_first = false;
    }

    frames
}

use std::sync::{Arc, Mutex};
use anyhow::bail;
use tracing::debug;
use crate::error::RSocketError;
use crate::frame::{Frame, FrameBody, FrameType, RequestFrame};
use crate::operation::OperationInbound;
use crate::payload::PayloadAssembler;

/// Entry point for all frames of a stream: checks if the operation expects the frame, reassembles
///  fragmented payloads and dispatches to the operation's [OperationInbound].
pub struct OperationFrameHandler {
    inbound: Arc<dyn OperationInbound>,
    assembler: Mutex<PayloadAssembler>,
}

impl OperationFrameHandler {
    pub fn new(inbound: Arc<dyn OperationInbound>) -> OperationFrameHandler {
        OperationFrameHandler {
            inbound,
            assembler: Mutex::new(PayloadAssembler::new()),
        }
    }

    /// An `Err` is a protocol violation, which is fatal for the connection
    pub fn handle_frame(&self, frame: Frame) -> anyhow::Result<()> {
        let stream_id = frame.stream_id;
        let frame_type = frame.frame_type();

        if frame_type == FrameType::Extension {
            debug!("stream {}: ignoring extension frame", stream_id);
            return Ok(());
        }
        if !self.inbound.accepts_frame_type(frame_type) {
            bail!("stream {}: {} frame is not expected", stream_id, frame_type.name());
        }
        if !self.inbound.should_receive_frame(frame_type) {
            debug!("stream {}: dropping {} frame received after the operation terminated", stream_id, frame_type.name());
            return Ok(());
        }

        match frame.body {
            FrameBody::Cancel => self.inbound.receive_cancel_frame(),
            FrameBody::Error(error) => self.inbound.receive_error_frame(error.to_error(stream_id)),
            FrameBody::RequestN(n) => self.inbound.receive_request_n_frame(n),
            FrameBody::Request(RequestFrame { frame_type: FrameType::Payload, follows, complete, next, payload, .. }) => {
                let payload = {
                    let mut assembler = self.assembler.lock().unwrap();
                    if complete {
                        if next {
                            Some(assembler.assemble_payload(payload))
                        }
                        else if assembler.has_payload() {
                            bail!("stream {}: COMPLETE without NEXT while payload fragments are pending", stream_id);
                        }
                        else {
                            None
                        }
                    }
                    else if next {
                        if follows {
                            assembler.append_fragment(payload);
                            return Ok(());
                        }
                        Some(assembler.assemble_payload(payload))
                    }
                    else {
                        bail!("stream {}: PAYLOAD frame with neither NEXT nor COMPLETE", stream_id);
                    }
                };
                self.inbound.receive_payload_frame(payload, complete)
            }
            _ => bail!("stream {}: {} frame is not expected", stream_id, frame_type.name()),
        }
    }

    /// The stream was removed from the connection
    pub fn handle_done(&self) {
        self.assembler.lock().unwrap().clear();
        self.inbound.receive_done();
    }

    pub fn operation_failure(&self, cause: RSocketError) {
        self.assembler.lock().unwrap().clear();
        self.inbound.operation_failure(cause);
    }
}

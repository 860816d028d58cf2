//! Operations are the per-stream state machines, one kind for each combination of interaction
//!  model and role (requester / responder).
//!
//! Each operation has an inbound part ([OperationInbound]) that the connection's receive loop
//!  calls synchronously for every frame of the stream, and an `execute` part that runs in its own
//!  task, sends the operation's frames through an [OperationOutbound] and waits for the
//!  operation to terminate. The two parts share state through the structs in this module.

use anyhow::bail;
#[cfg(test)] use mockall::automock;
use crate::error::RSocketError;
use crate::frame::FrameType;
use crate::payload::Payload;

mod frame_handler;
mod outbound;
mod requester_fire_and_forget;
mod requester_request_response;
mod requester_request_stream;
mod requester_request_channel;
mod responder_fire_and_forget;
mod responder_request_response;
mod responder_request_stream;
mod responder_request_channel;

pub use frame_handler::OperationFrameHandler;
pub use outbound::{fragment_payload, OperationOutbound};
pub use requester_fire_and_forget::RequesterFireAndForget;
pub use requester_request_response::{RequesterRequestResponse, ResponseReceiver};
pub use requester_request_stream::{RequesterRequestStream, StreamHandles};
pub use requester_request_channel::RequesterRequestChannel;
pub use responder_fire_and_forget::ResponderFireAndForget;
pub use responder_request_response::ResponderRequestResponse;
pub use responder_request_stream::ResponderRequestStream;
pub use responder_request_channel::ResponderRequestChannel;

/// The receiving side of an operation. All methods are called from the connection's receive
///  loop and must not block.
#[cfg_attr(test, automock)]
pub trait OperationInbound: Send + Sync {
    /// Frame types that this kind of operation can receive at all. Other frames are a protocol
    ///  violation.
    fn accepts_frame_type(&self, frame_type: FrameType) -> bool;

    /// Frame types that are still expected in the operation's current state. Others are dropped,
    ///  since they can legitimately cross a terminal frame on the wire.
    fn should_receive_frame(&self, frame_type: FrameType) -> bool;

    /// `payload` is `None` for a frame with COMPLETE but without NEXT
    fn receive_payload_frame(&self, _payload: Option<Payload>, _complete: bool) -> anyhow::Result<()> {
        bail!("PAYLOAD frame is not expected");
    }

    fn receive_request_n_frame(&self, _n: u32) -> anyhow::Result<()> {
        bail!("REQUEST_N frame is not expected");
    }

    fn receive_error_frame(&self, _error: RSocketError) -> anyhow::Result<()> {
        bail!("ERROR frame is not expected");
    }

    fn receive_cancel_frame(&self) -> anyhow::Result<()> {
        bail!("CANCEL frame is not expected");
    }

    /// The stream was removed, no more frames will be received
    fn receive_done(&self) {}

    /// The connection failed. Must release everything the operation holds and pass the cause to
    ///  the caller / handler.
    fn operation_failure(&self, cause: RSocketError);
}

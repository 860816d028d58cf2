use tracing::debug;
use crate::error::RSocketError;
use crate::frame::FrameType;
use crate::operation::{OperationInbound, OperationOutbound};
use crate::payload::Payload;

/// Fire-and-forget never receives anything. The operation only occupies its stream id while the
///  request (and its fragments) are sent.
pub struct RequesterFireAndForget;

impl RequesterFireAndForget {
    pub async fn execute(&self, outbound: &OperationOutbound, payload: Payload) -> Result<(), RSocketError> {
        if let Err(e) = outbound.send_request(FrameType::RequestFnF, payload, false, 0).await {
            debug!("stream {}: sending fire-and-forget failed: {}", outbound.stream_id(), e);
            // some fragments may have gone out already
            let _ = outbound.send_cancel().await;
            return Err(e);
        }
        Ok(())
    }
}

impl OperationInbound for RequesterFireAndForget {
    fn accepts_frame_type(&self, _frame_type: FrameType) -> bool {
        false
    }

    fn should_receive_frame(&self, _frame_type: FrameType) -> bool {
        false
    }

    fn operation_failure(&self, cause: RSocketError) {
        debug!("connection failed while sending fire-and-forget: {}", cause);
    }
}

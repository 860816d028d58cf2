use std::sync::Arc;
use tokio::select;
use tracing::debug;
use crate::error::RSocketError;
use crate::frame::FrameType;
use crate::operation::OperationInbound;
use crate::termination::Termination;
use crate::payload::Payload;
use crate::rsocket::RSocket;

pub struct ResponderFireAndForget {
    cancelled: Termination,
}

impl ResponderFireAndForget {
    pub fn new() -> ResponderFireAndForget {
        ResponderFireAndForget {
            cancelled: Termination::new(),
        }
    }

    /// Runs the handler. It is dropped if the requester cancels the request before it finishes.
    pub async fn execute(&self, stream_id: u32, responder: Arc<dyn RSocket>, payload: Payload) {
        select! {
            biased;
            _ = self.cancelled.wait() => {
                debug!("stream {}: fire-and-forget cancelled", stream_id);
            }
            result = responder.fire_and_forget(payload) => {
                self.cancelled.terminate();
                if let Err(e) = result {
                    // there is no one to report this to
                    debug!("stream {}: fire-and-forget handler failed: {}", stream_id, e);
                }
            }
        }
    }
}

impl Default for ResponderFireAndForget {
    fn default() -> Self {
        ResponderFireAndForget::new()
    }
}

impl OperationInbound for ResponderFireAndForget {
    fn accepts_frame_type(&self, frame_type: FrameType) -> bool {
        frame_type == FrameType::Cancel
    }

    fn should_receive_frame(&self, _frame_type: FrameType) -> bool {
        !self.cancelled.is_terminated()
    }

    fn receive_cancel_frame(&self) -> anyhow::Result<()> {
        self.cancelled.terminate();
        Ok(())
    }

    fn operation_failure(&self, _cause: RSocketError) {
        self.cancelled.terminate();
    }
}

use std::sync::Arc;
use tokio::select;
use tracing::debug;
use crate::error::RSocketError;
use crate::frame::FrameType;
use crate::limiter::Limiter;
use crate::operation::{OperationInbound, OperationOutbound};
use crate::termination::Termination;
use crate::payload::Payload;
use crate::rsocket::RSocket;
use crate::streams::PayloadStream;

pub struct ResponderRequestStream {
    done: Termination,
    limiter: Limiter,
}

impl ResponderRequestStream {
    pub fn new(initial_request: u32) -> ResponderRequestStream {
        ResponderRequestStream {
            done: Termination::new(),
            limiter: Limiter::new(initial_request),
        }
    }

    /// Runs the handler and sends its items as the requester grants credit
    pub async fn execute(&self, outbound: &OperationOutbound, responder: Arc<dyn RSocket>, payload: Payload) {
        let stream_id = outbound.stream_id();
        let respond = async {
            let payloads = match responder.request_stream(payload).await {
                Ok(payloads) => payloads,
                Err(e) => PayloadStream::failed(e),
            };
            outbound.send_payloads(&self.limiter, payloads).await
        };

        select! {
            biased;
            _ = self.done.wait() => {
                debug!("stream {}: request-stream cancelled", stream_id);
            }
            result = respond => {
                self.done.terminate();
                if let Err(e) = result {
                    debug!("stream {}: request-stream terminated with error: {}", stream_id, e);
                }
            }
        }
    }
}

impl OperationInbound for ResponderRequestStream {
    fn accepts_frame_type(&self, frame_type: FrameType) -> bool {
        matches!(frame_type, FrameType::Cancel | FrameType::RequestN)
    }

    fn should_receive_frame(&self, _frame_type: FrameType) -> bool {
        !self.done.is_terminated()
    }

    fn receive_request_n_frame(&self, n: u32) -> anyhow::Result<()> {
        self.limiter.update_requests(n);
        Ok(())
    }

    fn receive_cancel_frame(&self) -> anyhow::Result<()> {
        self.done.terminate();
        Ok(())
    }

    fn operation_failure(&self, _cause: RSocketError) {
        self.done.terminate();
    }
}

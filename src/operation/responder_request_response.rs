use std::sync::Arc;
use tokio::select;
use tracing::debug;
use crate::error::RSocketError;
use crate::frame::FrameType;
use crate::operation::{OperationInbound, OperationOutbound};
use crate::termination::Termination;
use crate::payload::Payload;
use crate::rsocket::RSocket;

pub struct ResponderRequestResponse {
    /// set by a CANCEL, or when the handler finished
    done: Termination,
}

impl ResponderRequestResponse {
    pub fn new() -> ResponderRequestResponse {
        ResponderRequestResponse {
            done: Termination::new(),
        }
    }

    pub async fn execute(&self, outbound: &OperationOutbound, responder: Arc<dyn RSocket>, payload: Payload) {
        let result = select! {
            biased;
            _ = self.done.wait() => {
                debug!("stream {}: request-response cancelled", outbound.stream_id());
                return;
            }
            result = responder.request_response(payload) => result,
        };

        if !self.done.terminate() {
            // a CANCEL arrived while the handler was finishing
            return;
        }

        let sent = match result {
            Ok(payload) => outbound.send_next(payload, true).await,
            Err(e) => outbound.send_error(&e.for_stream()).await,
        };
        if let Err(e) = sent {
            debug!("stream {}: sending the response failed: {}", outbound.stream_id(), e);
        }
    }
}

impl Default for ResponderRequestResponse {
    fn default() -> Self {
        ResponderRequestResponse::new()
    }
}

impl OperationInbound for ResponderRequestResponse {
    fn accepts_frame_type(&self, frame_type: FrameType) -> bool {
        frame_type == FrameType::Cancel
    }

    fn should_receive_frame(&self, _frame_type: FrameType) -> bool {
        !self.done.is_terminated()
    }

    fn receive_cancel_frame(&self) -> anyhow::Result<()> {
        self.done.terminate();
        Ok(())
    }

    fn operation_failure(&self, _cause: RSocketError) {
        self.done.terminate();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tokio::time;
    use crate::frame::Frame;
    use crate::rsocket::MockRSocket;
    use crate::test_util::operation::test_outbound;
    use crate::test_util::responder::PendingResponder;
    use super::*;

    #[tokio::test]
    async fn test_response() {
        let (outbound, mut frames) = test_outbound(2, 0);
        let mut responder = MockRSocket::new();
        responder.expect_request_response()
            .times(1)
            .returning(|p| Ok(Payload::from_data(format!("{}-pong", p.data_utf8()))));

        let operation = ResponderRequestResponse::new();
        operation.execute(&outbound, Arc::new(responder), Payload::from_data("ping")).await;

        assert_eq!(frames.next_frame().await, Frame::payload(2, Payload::from_data("ping-pong"), true, true));
        assert!(frames.is_empty());
        assert!(!operation.should_receive_frame(FrameType::Cancel));
    }

    #[tokio::test]
    async fn test_handler_error() {
        let (outbound, mut frames) = test_outbound(2, 0);
        let mut responder = MockRSocket::new();
        responder.expect_request_response()
            .returning(|_| Err(RSocketError::Rejected("busy".to_string())));

        ResponderRequestResponse::new().execute(&outbound, Arc::new(responder), Payload::empty()).await;

        assert_eq!(frames.next_frame().await, Frame::error(2, &RSocketError::Rejected("busy".to_string())));
    }

    #[tokio::test]
    async fn test_connection_level_error_is_not_sent_on_stream() {
        let (outbound, mut frames) = test_outbound(2, 0);
        let mut responder = MockRSocket::new();
        responder.expect_request_response()
            .returning(|_| Err(RSocketError::ConnectionError("oops".to_string())));

        ResponderRequestResponse::new().execute(&outbound, Arc::new(responder), Payload::empty()).await;

        assert_eq!(frames.next_frame().await, Frame::error(2, &RSocketError::ApplicationError("oops".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let (outbound, mut frames) = test_outbound(2, 0);
        let operation = Arc::new(ResponderRequestResponse::new());

        let op2 = operation.clone();
        let task = tokio::spawn(async move { op2.execute(&outbound, Arc::new(PendingResponder), Payload::empty()).await });
        time::sleep(Duration::from_millis(10)).await;

        operation.receive_cancel_frame().unwrap();
        task.await.unwrap();
        assert!(frames.is_empty());
    }
}

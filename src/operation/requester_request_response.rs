use std::sync::Mutex;
use tokio::select;
use tokio::sync::oneshot;
use tracing::debug;
use crate::error::RSocketError;
use crate::frame::FrameType;
use crate::operation::{OperationInbound, OperationOutbound};
use crate::termination::Termination;
use crate::payload::Payload;

pub type ResponseReceiver = oneshot::Receiver<Result<Payload, RSocketError>>;

pub struct RequesterRequestResponse {
    response: Mutex<Option<oneshot::Sender<Result<Payload, RSocketError>>>>,
    done: Termination,
}

impl RequesterRequestResponse {
    pub fn new() -> (RequesterRequestResponse, ResponseReceiver) {
        let (tx, rx) = oneshot::channel();
        let operation = RequesterRequestResponse {
            response: Mutex::new(Some(tx)),
            done: Termination::new(),
        };
        (operation, rx)
    }

    fn complete(&self, result: Result<Payload, RSocketError>) {
        // terminal state first: once the caller sees the result, its 'abandoned' signal must not
        //  trigger a CANCEL
        self.done.terminate();
        if let Some(response) = self.response.lock().unwrap().take() {
            let _ = response.send(result);
        }
    }

    /// Sends the request and waits for the response, or for the caller to drop its end of
    ///  `abandoned` before the response arrived, which cancels the request.
    pub async fn execute(&self, outbound: &OperationOutbound, payload: Payload, abandoned: oneshot::Receiver<()>) {
        if let Err(e) = outbound.send_request(FrameType::RequestResponse, payload, false, 0).await {
            self.complete(Err(e));
            return;
        }

        select! {
            biased;
            _ = self.done.wait() => {}
            _ = abandoned => {
                if self.done.terminate() {
                    debug!("stream {}: caller abandoned request-response", outbound.stream_id());
                    self.response.lock().unwrap().take();
                    let _ = outbound.send_cancel().await;
                }
            }
        }
    }
}

impl OperationInbound for RequesterRequestResponse {
    fn accepts_frame_type(&self, frame_type: FrameType) -> bool {
        matches!(frame_type, FrameType::Payload | FrameType::Error)
    }

    fn should_receive_frame(&self, _frame_type: FrameType) -> bool {
        !self.done.is_terminated()
    }

    fn receive_payload_frame(&self, payload: Option<Payload>, _complete: bool) -> anyhow::Result<()> {
        match payload {
            Some(payload) => self.complete(Ok(payload)),
            None => self.complete(Err(RSocketError::Invalid("response completed without a payload".to_string()))),
        }
        Ok(())
    }

    fn receive_error_frame(&self, error: RSocketError) -> anyhow::Result<()> {
        self.complete(Err(error));
        Ok(())
    }

    fn receive_done(&self) {
        if !self.done.is_terminated() {
            self.complete(Err(RSocketError::Canceled("stream ended without a response".to_string())));
        }
    }

    fn operation_failure(&self, cause: RSocketError) {
        self.complete(Err(cause));
    }
}

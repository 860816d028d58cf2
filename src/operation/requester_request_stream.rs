use std::sync::Mutex;
use tokio::select;
use tokio::sync::mpsc;
use tracing::debug;
use crate::error::RSocketError;
use crate::frame::FrameType;
use crate::limiter::RequestStrategy;
use crate::operation::{OperationInbound, OperationOutbound};
use crate::termination::Termination;
use crate::payload::Payload;
use crate::streams::{PayloadItem, PayloadStream};

pub struct RequesterRequestStream {
    items: Mutex<Option<mpsc::UnboundedSender<PayloadItem>>>,
    done: Termination,
}

/// The caller's handles on a requester stream
pub struct StreamHandles {
    pub stream: PayloadStream,
    pub initial_request: u32,
    pub request_n: mpsc::UnboundedReceiver<u32>,
}

impl RequesterRequestStream {
    pub fn new(strategy: RequestStrategy) -> (RequesterRequestStream, StreamHandles) {
        let (items_tx, items_rx) = mpsc::unbounded_channel();
        let (request_n_tx, request_n_rx) = mpsc::unbounded_channel();

        let mut demand = strategy.demand();
        let initial_request = demand.first_request();

        let operation = RequesterRequestStream {
            items: Mutex::new(Some(items_tx)),
            done: Termination::new(),
        };
        let handles = StreamHandles {
            stream: PayloadStream::with_demand(items_rx, demand, request_n_tx),
            initial_request,
            request_n: request_n_rx,
        };
        (operation, handles)
    }

    fn finish(&self, error: Option<RSocketError>) {
        self.done.terminate();
        if let Some(items) = self.items.lock().unwrap().take() {
            if let Some(error) = error {
                let _ = items.send(Err(error));
            }
        }
    }

    /// Sends the request, then turns the consumer's demand into REQUEST_N frames until the stream
    ///  terminates. If the consumer drops its stream first, the stream is cancelled.
    pub async fn execute(&self, outbound: &OperationOutbound, payload: Payload, initial_request: u32, mut request_n: mpsc::UnboundedReceiver<u32>) {
        if let Err(e) = outbound.send_request(FrameType::RequestStream, payload, false, initial_request).await {
            self.finish(Some(e));
            return;
        }

        loop {
            select! {
                biased;
                _ = self.done.wait() => break,
                n = request_n.recv() => match n {
                    Some(n) => {
                        if self.done.is_terminated() {
                            break;
                        }
                        if let Err(e) = outbound.send_request_n(n).await {
                            self.finish(Some(e));
                            break;
                        }
                    }
                    None => {
                        if self.done.terminate() {
                            debug!("stream {}: consumer dropped the stream", outbound.stream_id());
                            self.items.lock().unwrap().take();
                            let _ = outbound.send_cancel().await;
                        }
                        break;
                    }
                }
            }
        }
    }
}

impl OperationInbound for RequesterRequestStream {
    fn accepts_frame_type(&self, frame_type: FrameType) -> bool {
        matches!(frame_type, FrameType::Payload | FrameType::Error)
    }

    fn should_receive_frame(&self, _frame_type: FrameType) -> bool {
        !self.done.is_terminated()
    }

    fn receive_payload_frame(&self, payload: Option<Payload>, complete: bool) -> anyhow::Result<()> {
        if let Some(payload) = payload {
            if let Some(items) = self.items.lock().unwrap().as_ref() {
                let _ = items.send(Ok(payload));
            }
        }
        if complete {
            self.finish(None);
        }
        Ok(())
    }

    fn receive_error_frame(&self, error: RSocketError) -> anyhow::Result<()> {
        self.finish(Some(error));
        Ok(())
    }

    fn receive_done(&self) {
        if !self.done.is_terminated() {
            self.finish(Some(RSocketError::Canceled("unexpected end of stream".to_string())));
        }
    }

    fn operation_failure(&self, cause: RSocketError) {
        self.finish(Some(cause));
    }
}

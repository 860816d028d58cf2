use std::sync::{Arc, Mutex};
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use crate::error::RSocketError;
use crate::frame::FrameType;
use crate::limiter::{Limiter, RequestStrategy};
use crate::operation::{OperationInbound, OperationOutbound, StreamHandles};
use crate::termination::Termination;
use crate::payload::Payload;
use crate::rsocket::RSocket;
use crate::streams::{PayloadItem, PayloadStream};

/// The responder side of a channel. The handler consumes the requester's items (inbound) and
///  produces the responses (outbound). A CANCEL or ERROR from the requester terminates both
///  directions, and so does an ERROR sent by the handler.
pub struct ResponderRequestChannel {
    items: Mutex<Option<mpsc::UnboundedSender<PayloadItem>>>,
    inbound_done: Termination,
    outbound_done: Termination,
    limiter: Arc<Limiter>,
}

impl ResponderRequestChannel {
    /// `initial_request` and `request_complete` are taken from the REQUEST_CHANNEL frame: the
    ///  credit for responses, and whether the request's first item was also its last.
    pub fn new(initial_request: u32, request_complete: bool, strategy: RequestStrategy) -> (ResponderRequestChannel, StreamHandles) {
        let (items_tx, items_rx) = mpsc::unbounded_channel();
        let (request_n_tx, request_n_rx) = mpsc::unbounded_channel();

        let mut demand = strategy.demand();
        let first_request = demand.first_request();

        let operation = ResponderRequestChannel {
            items: Mutex::new(Some(items_tx)),
            inbound_done: Termination::new(),
            outbound_done: Termination::new(),
            limiter: Arc::new(Limiter::new(initial_request)),
        };
        if request_complete {
            operation.finish_inbound(None);
        }

        let handles = StreamHandles {
            stream: PayloadStream::with_demand(items_rx, demand, request_n_tx),
            initial_request: first_request,
            request_n: request_n_rx,
        };
        (operation, handles)
    }

    fn finish_inbound(&self, error: Option<RSocketError>) {
        self.inbound_done.terminate();
        if let Some(items) = self.items.lock().unwrap().take() {
            if let Some(error) = error {
                let _ = items.send(Err(error));
            }
        }
    }

    /// Requests the first items from the requester and runs the handler in a separate task,
    ///  forwarding demand for inbound items until both directions are terminated.
    pub async fn execute(&self, outbound: &OperationOutbound, responder: Arc<dyn RSocket>, initial: Payload, handles: StreamHandles) {
        let stream_id = outbound.stream_id();
        let StreamHandles { stream: inbound, initial_request, mut request_n } = handles;

        if !self.inbound_done.is_terminated() {
            if let Err(e) = outbound.send_request_n(initial_request).await {
                debug!("stream {}: connection closed before the channel started: {}", stream_id, e);
                self.outbound_done.terminate();
                self.finish_inbound(None);
                return;
            }
        }

        let mut handler = {
            let outbound = outbound.clone();
            let limiter = self.limiter.clone();
            tokio::spawn(async move {
                let payloads = match responder.request_channel(initial, inbound).await {
                    Ok(payloads) => payloads,
                    Err(e) => PayloadStream::failed(e),
                };
                outbound.send_payloads(&limiter, payloads).await
            })
        };
        let mut handler_finished = false;

        loop {
            if handler_finished && self.inbound_done.is_terminated() {
                break;
            }

            select! {
                biased;
                _ = self.outbound_done.wait(), if !handler_finished => {
                    debug!("stream {}: channel terminated by the requester", stream_id);
                    handler.abort();
                    handler_finished = true;
                }
                result = &mut handler, if !handler_finished => {
                    handler_finished = true;
                    self.outbound_done.terminate();
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!("stream {}: channel terminated with error: {}", stream_id, e);
                            self.finish_inbound(None);
                        }
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => {
                            warn!("stream {}: channel handler failed: {}", stream_id, e);
                            let _ = outbound.send_error(&RSocketError::ApplicationError("channel handler failed".to_string())).await;
                            self.finish_inbound(None);
                        }
                    }
                }
                _ = self.inbound_done.wait(), if !self.inbound_done.is_terminated() => {}
                n = request_n.recv(), if !self.inbound_done.is_terminated() => match n {
                    Some(n) => {
                        if let Err(e) = outbound.send_request_n(n).await {
                            debug!("stream {}: sending REQUEST_N failed: {}", stream_id, e);
                            self.outbound_done.terminate();
                            self.finish_inbound(None);
                        }
                    }
                    None => {
                        // the handler is no longer interested in the requester's items
                        if self.inbound_done.terminate() {
                            self.items.lock().unwrap().take();
                            let _ = outbound.send_cancel().await;
                        }
                    }
                }
            }
        }
    }
}

impl OperationInbound for ResponderRequestChannel {
    fn accepts_frame_type(&self, frame_type: FrameType) -> bool {
        matches!(frame_type, FrameType::Payload | FrameType::Error | FrameType::RequestN | FrameType::Cancel)
    }

    fn should_receive_frame(&self, frame_type: FrameType) -> bool {
        match frame_type {
            FrameType::Payload => !self.inbound_done.is_terminated(),
            FrameType::RequestN | FrameType::Cancel => !self.outbound_done.is_terminated(),
            _ => !self.inbound_done.is_terminated() || !self.outbound_done.is_terminated(),
        }
    }

    fn receive_payload_frame(&self, payload: Option<Payload>, complete: bool) -> anyhow::Result<()> {
        if let Some(payload) = payload {
            if let Some(items) = self.items.lock().unwrap().as_ref() {
                let _ = items.send(Ok(payload));
            }
        }
        if complete {
            self.finish_inbound(None);
        }
        Ok(())
    }

    fn receive_request_n_frame(&self, n: u32) -> anyhow::Result<()> {
        self.limiter.update_requests(n);
        Ok(())
    }

    fn receive_error_frame(&self, error: RSocketError) -> anyhow::Result<()> {
        self.outbound_done.terminate();
        self.finish_inbound(Some(error));
        Ok(())
    }

    fn receive_cancel_frame(&self) -> anyhow::Result<()> {
        self.outbound_done.terminate();
        self.finish_inbound(None);
        Ok(())
    }

    fn receive_done(&self) {
        self.outbound_done.terminate();
        self.finish_inbound(None);
    }

    fn operation_failure(&self, cause: RSocketError) {
        self.outbound_done.terminate();
        self.finish_inbound(Some(cause));
    }
}

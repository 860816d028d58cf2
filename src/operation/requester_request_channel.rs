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
use crate::streams::{PayloadItem, PayloadStream};

/// A channel has two directions that terminate independently: the responses (inbound) end with
///  the peer's COMPLETE, and the requests (outbound) end when the local sequence is exhausted or
///  the peer cancels it. ERROR from either side, or a local cancel, ends both.
pub struct RequesterRequestChannel {
    items: Mutex<Option<mpsc::UnboundedSender<PayloadItem>>>,
    inbound_done: Termination,
    outbound_done: Termination,
    limiter: Arc<Limiter>,
}

impl RequesterRequestChannel {
    pub fn new(strategy: RequestStrategy) -> (RequesterRequestChannel, StreamHandles) {
        let (items_tx, items_rx) = mpsc::unbounded_channel();
        let (request_n_tx, request_n_rx) = mpsc::unbounded_channel();

        let mut demand = strategy.demand();
        let initial_request = demand.first_request();

        let operation = RequesterRequestChannel {
            items: Mutex::new(Some(items_tx)),
            inbound_done: Termination::new(),
            outbound_done: Termination::new(),
            limiter: Arc::new(Limiter::new(0)),
        };
        let handles = StreamHandles {
            stream: PayloadStream::with_demand(items_rx, demand, request_n_tx),
            initial_request,
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

    fn finish(&self, error: RSocketError) {
        self.outbound_done.terminate();
        self.finish_inbound(Some(error));
    }

    /// Sends the request with `initial` as the first item, then runs the outbound sequence
    ///  `payloads` in a separate task while forwarding the consumer's demand, until both
    ///  directions are terminated.
    pub async fn execute(&self, outbound: &OperationOutbound, initial: Payload, payloads: PayloadStream, initial_request: u32, mut request_n: mpsc::UnboundedReceiver<u32>) {
        let stream_id = outbound.stream_id();

        if let Err(e) = outbound.send_request(FrameType::RequestChannel, initial, false, initial_request).await {
            self.finish(e);
            return;
        }

        let mut sender = {
            let outbound = outbound.clone();
            let limiter = self.limiter.clone();
            tokio::spawn(async move { outbound.send_payloads(&limiter, payloads).await })
        };
        let mut sender_finished = false;

        loop {
            if sender_finished && self.inbound_done.is_terminated() {
                break;
            }

            select! {
                biased;
                _ = self.outbound_done.wait(), if !sender_finished => {
                    debug!("stream {}: outbound direction terminated by the peer", stream_id);
                    sender.abort();
                    sender_finished = true;
                }
                result = &mut sender, if !sender_finished => {
                    sender_finished = true;
                    self.outbound_done.terminate();
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => self.finish_inbound(Some(e)),
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => {
                            warn!("stream {}: sender task failed: {}", stream_id, e);
                            let error = RSocketError::ApplicationError("sending the request sequence failed".to_string());
                            let _ = outbound.send_error(&error).await;
                            self.finish_inbound(Some(error));
                        }
                    }
                }
                _ = self.inbound_done.wait(), if !self.inbound_done.is_terminated() => {}
                n = request_n.recv(), if !self.inbound_done.is_terminated() => match n {
                    Some(n) => {
                        if let Err(e) = outbound.send_request_n(n).await {
                            self.finish(e);
                        }
                    }
                    None => {
                        if self.inbound_done.terminate() {
                            debug!("stream {}: consumer dropped the channel", stream_id);
                            self.items.lock().unwrap().take();
                            self.outbound_done.terminate();
                            let _ = outbound.send_cancel().await;
                        }
                    }
                }
            }
        }
    }
}

impl OperationInbound for RequesterRequestChannel {
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
        self.finish(error);
        Ok(())
    }

    fn receive_cancel_frame(&self) -> anyhow::Result<()> {
        self.outbound_done.terminate();
        Ok(())
    }

    fn receive_done(&self) {
        if !self.inbound_done.is_terminated() {
            self.finish(RSocketError::Canceled("unexpected end of channel".to_string()));
        }
        self.outbound_done.terminate();
    }

    fn operation_failure(&self, cause: RSocketError) {
        self.finish(cause);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tokio::time;
    use crate::frame::Frame;
    use crate::test_util::operation::test_outbound;
    use super::*;

    fn start(stream_id: u32, initial: Payload, payloads: PayloadStream) -> (Arc<RequesterRequestChannel>, PayloadStream, crate::test_util::operation::CapturedFrames, tokio::task::JoinHandle<()>) {
        let (outbound, frames) = test_outbound(stream_id, 0);
        let (operation, handles) = RequesterRequestChannel::new(RequestStrategy::prefetch(4, 1));
        let operation = Arc::new(operation);
        let StreamHandles { stream, initial_request, request_n } = handles;

        let op2 = operation.clone();
        let task = tokio::spawn(async move { op2.execute(&outbound, initial, payloads, initial_request, request_n).await });
        (operation, stream, frames, task)
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_directions() {
        let payloads = PayloadStream::from_payloads([Payload::from_data("b"), Payload::from_data("c")]);
        let (operation, mut stream, mut frames, task) = start(1, Payload::from_data("a"), payloads);

        assert_eq!(frames.next_frame().await, Frame::request(1, FrameType::RequestChannel, 4, Payload::from_data("a")));

        // no credit, no items
        time::sleep(Duration::from_millis(10)).await;
        assert!(frames.is_empty());

        operation.receive_request_n_frame(1).unwrap();
        assert_eq!(frames.next_frame().await, Frame::payload(1, Payload::from_data("b"), true, false));
        time::sleep(Duration::from_millis(10)).await;
        assert!(frames.is_empty());

        operation.receive_request_n_frame(10).unwrap();
        assert_eq!(frames.next_frame().await, Frame::payload(1, Payload::from_data("c"), true, false));
        assert_eq!(frames.next_frame().await, Frame::payload(1, Payload::empty(), false, true));
        time::sleep(Duration::from_millis(10)).await;
        assert!(!operation.should_receive_frame(FrameType::RequestN));

        operation.receive_payload_frame(Some(Payload::from_data("x")), false).unwrap();
        operation.receive_payload_frame(None, true).unwrap();
        assert_eq!(stream.next().await, Some(Ok(Payload::from_data("x"))));
        assert_eq!(stream.next().await, None);

        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_cancel_stops_sender() {
        let (sink, payloads) = PayloadStream::channel(1);
        let (operation, mut stream, mut frames, task) = start(1, Payload::empty(), payloads);
        frames.next_frame().await;

        operation.receive_cancel_frame().unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert!(sink.is_closed());
        assert!(!operation.should_receive_frame(FrameType::RequestN));

        // responses still arrive
        assert!(operation.should_receive_frame(FrameType::Payload));
        operation.receive_payload_frame(Some(Payload::from_data("x")), true).unwrap();
        assert_eq!(stream.next().await, Some(Ok(Payload::from_data("x"))));

        task.await.unwrap();
        assert!(frames.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_drop_cancels() {
        let (sink, payloads) = PayloadStream::channel(1);
        let (_operation, stream, mut frames, task) = start(3, Payload::empty(), payloads);
        frames.next_frame().await;

        drop(stream);
        assert_eq!(frames.next_frame().await, Frame::cancel(3));
        task.await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert!(sink.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_failure_terminates_channel() {
        let payloads = PayloadStream::failed(RSocketError::Rejected("nope".to_string()));
        let (_operation, mut stream, mut frames, task) = start(1, Payload::empty(), payloads);
        frames.next_frame().await;

        assert_eq!(frames.next_frame().await, Frame::error(1, &RSocketError::Rejected("nope".to_string())));
        assert_eq!(stream.next().await, Some(Err(RSocketError::Rejected("nope".to_string()))));
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_error_terminates_channel() {
        let (sink, payloads) = PayloadStream::channel(1);
        let (operation, mut stream, mut frames, task) = start(1, Payload::empty(), payloads);
        frames.next_frame().await;

        operation.receive_error_frame(RSocketError::ApplicationError("boom".to_string())).unwrap();
        assert_eq!(stream.next().await, Some(Err(RSocketError::ApplicationError("boom".to_string()))));
        task.await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert!(sink.is_closed());
        assert!(frames.is_empty());
    }
}

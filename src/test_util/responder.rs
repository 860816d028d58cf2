use std::future;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use crate::error::RSocketError;
use crate::payload::Payload;
use crate::rsocket::RSocket;
use crate::streams::PayloadStream;

/// A responder whose handlers never finish, for testing cancellation
pub struct PendingResponder;

#[async_trait]
impl RSocket for PendingResponder {
    async fn metadata_push(&self, _metadata: Bytes) -> Result<(), RSocketError> {
        future::pending().await
    }

    async fn fire_and_forget(&self, _payload: Payload) -> Result<(), RSocketError> {
        future::pending().await
    }

    async fn request_response(&self, _payload: Payload) -> Result<Payload, RSocketError> {
        future::pending().await
    }

    async fn request_stream(&self, _payload: Payload) -> Result<PayloadStream, RSocketError> {
        future::pending().await
    }

    async fn request_channel(&self, _initial: Payload, _payloads: PayloadStream) -> Result<PayloadStream, RSocketError> {
        future::pending().await
    }
}

/// Like [PendingResponder], but reports each handler that is dropped before it finished, i.e.
///  that was cancelled
pub struct CancelTrackingResponder {
    cancelled: mpsc::UnboundedSender<&'static str>,
}

impl CancelTrackingResponder {
    /// Returns the responder and the receiver of the cancelled interactions' names
    pub fn new() -> (CancelTrackingResponder, mpsc::UnboundedReceiver<&'static str>) {
        let (cancelled, rx) = mpsc::unbounded_channel();
        (CancelTrackingResponder { cancelled }, rx)
    }

    async fn pending<T>(&self, interaction: &'static str) -> Result<T, RSocketError> {
        let _guard = CancelGuard {
            interaction,
            cancelled: self.cancelled.clone(),
        };
        future::pending().await
    }
}

struct CancelGuard {
    interaction: &'static str,
    cancelled: mpsc::UnboundedSender<&'static str>,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        let _ = self.cancelled.send(self.interaction);
    }
}

#[async_trait]
impl RSocket for CancelTrackingResponder {
    async fn fire_and_forget(&self, _payload: Payload) -> Result<(), RSocketError> {
        self.pending("fire_and_forget").await
    }

    async fn request_response(&self, _payload: Payload) -> Result<Payload, RSocketError> {
        self.pending("request_response").await
    }

    async fn request_stream(&self, _payload: Payload) -> Result<PayloadStream, RSocketError> {
        self.pending("request_stream").await
    }

    async fn request_channel(&self, _initial: Payload, _payloads: PayloadStream) -> Result<PayloadStream, RSocketError> {
        self.pending("request_channel").await
    }
}

/// Answers 'ping' with 'pong', streams `count` items for a request `count`, echoes channels and
///  rejects everything else
pub struct PingPongResponder;

#[async_trait]
impl RSocket for PingPongResponder {
    async fn request_response(&self, payload: Payload) -> Result<Payload, RSocketError> {
        match payload.data_utf8().as_ref() {
            "ping" => Ok(Payload::from_data("pong")),
            other => Err(RSocketError::Rejected(format!("expected 'ping', was '{}'", other))),
        }
    }

    async fn request_stream(&self, payload: Payload) -> Result<PayloadStream, RSocketError> {
        let count: usize = payload.data_utf8().parse()
            .map_err(|_| RSocketError::Invalid("request must be a number".to_string()))?;
        Ok(PayloadStream::from_payloads((0..count).map(|i| Payload::from_data(format!("item-{}", i)))))
    }

    async fn request_channel(&self, initial: Payload, mut payloads: PayloadStream) -> Result<PayloadStream, RSocketError> {
        let (sink, stream) = PayloadStream::channel(8);
        tokio::spawn(async move {
            sink.send(initial).await?;
            while let Some(item) = payloads.next().await {
                match item {
                    Ok(payload) => sink.send(payload).await?,
                    Err(e) => {
                        sink.fail(e).await;
                        break;
                    }
                }
            }
            Ok::<_, RSocketError>(())
        });
        Ok(stream)
    }
}

use std::pin::Pin;
use std::task::{Context, Poll};
use futures::Stream;
use tokio::sync::mpsc;
use tracing::trace;
use crate::error::RSocketError;
use crate::limiter::Demand;
use crate::payload::Payload;

pub type PayloadItem = Result<Payload, RSocketError>;

enum Items {
    Bounded(mpsc::Receiver<PayloadItem>),
    Unbounded(mpsc::UnboundedReceiver<PayloadItem>),
}

impl Items {
    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<PayloadItem>> {
        match self {
            Items::Bounded(rx) => rx.poll_recv(cx),
            Items::Unbounded(rx) => rx.poll_recv(cx),
        }
    }
}

struct StreamDemand {
    demand: Demand,
    request_n: mpsc::UnboundedSender<u32>,
}

/// A sequence of payloads, terminated by the end of the sequence or by an error.
///
/// Streams received from the peer carry their demand: consuming items makes the stream ask the
///  peer for more through REQUEST_N frames, and dropping the stream cancels it. Streams created
///  locally (for sending) are fed through a [PayloadSink], whose bounded buffer applies
///  backpressure to the producer.
pub struct PayloadStream {
    items: Items,
    demand: Option<StreamDemand>,
}

impl PayloadStream {
    /// Creates a stream that is fed through the returned sink. Completing the sink (dropping it)
    ///  completes the stream.
    pub fn channel(buffer: usize) -> (PayloadSink, PayloadStream) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            PayloadSink { items: tx },
            PayloadStream {
                items: Items::Bounded(rx),
                demand: None,
            }
        )
    }

    pub fn from_payloads(payloads: impl IntoIterator<Item = Payload>) -> PayloadStream {
        let (tx, rx) = mpsc::unbounded_channel();
        for p in payloads {
            let _ = tx.send(Ok(p));
        }
        PayloadStream::unbounded(rx)
    }

    pub fn empty() -> PayloadStream {
        PayloadStream::from_payloads([])
    }

    pub fn failed(error: RSocketError) -> PayloadStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Err(error));
        PayloadStream::unbounded(rx)
    }

    pub(crate) fn unbounded(items: mpsc::UnboundedReceiver<PayloadItem>) -> PayloadStream {
        PayloadStream {
            items: Items::Unbounded(items),
            demand: None,
        }
    }

    /// A stream of payloads received from the peer. The initial request is sent by the operation,
    ///  the stream sends follow-up requests to `request_n` as items are consumed.
    pub(crate) fn with_demand(items: mpsc::UnboundedReceiver<PayloadItem>, demand: Demand, request_n: mpsc::UnboundedSender<u32>) -> PayloadStream {
        PayloadStream {
            items: Items::Unbounded(items),
            demand: Some(StreamDemand { demand, request_n }),
        }
    }

    /// Returns the next item, or `None` after the end of the stream. An `Err` item terminates the
    ///  stream.
    pub async fn next(&mut self) -> Option<PayloadItem> {
        std::future::poll_fn(|cx| self.poll_item(cx)).await
    }

    fn poll_item(&mut self, cx: &mut Context<'_>) -> Poll<Option<PayloadItem>> {
        let item = match self.items.poll_recv(cx) {
            Poll::Ready(Some(item)) => item,
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => return Poll::Pending,
        };

        if item.is_ok() {
            if let Some(d) = &mut self.demand {
                let n = d.demand.next_request();
                if n > 0 {
                    trace!("requesting {} more items", n);
                    // the operation may be finished already, in which case the request is moot
                    let _ = d.request_n.send(n);
                }
            }
        }
        Poll::Ready(Some(item))
    }

    /// Consumes the entire stream, failing on the first error
    pub async fn collect(mut self) -> Result<Vec<Payload>, RSocketError> {
        let mut result = Vec::new();
        while let Some(item) = self.next().await {
            result.push(item?);
        }
        Ok(result)
    }
}

/// Polling a stream has the same effect on demand as [PayloadStream::next]
impl Stream for PayloadStream {
    type Item = PayloadItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<PayloadItem>> {
        self.get_mut().poll_item(cx)
    }
}

/// The producer side of a [PayloadStream] created by [PayloadStream::channel]
#[derive(Clone)]
pub struct PayloadSink {
    items: mpsc::Sender<PayloadItem>,
}

impl PayloadSink {
    /// Waits for room in the buffer. Fails if the consumer is gone, e.g. because the peer
    ///  cancelled the stream.
    pub async fn send(&self, payload: Payload) -> Result<(), RSocketError> {
        self.items.send(Ok(payload)).await
            .map_err(|_| RSocketError::Canceled("the stream was cancelled".to_string()))
    }

    /// Terminates the stream with an error
    pub async fn fail(self, error: RSocketError) {
        let _ = self.items.send(Err(error)).await;
    }

    pub fn is_closed(&self) -> bool {
        self.items.is_closed()
    }
}

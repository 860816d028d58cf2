//! A connection multiplexes streams over one transport. It is driven by a single task that runs
//!  the send loop, the receive loop and keep-alive, and tears everything down when any of them
//!  terminates.
//!
//! [Connection] is the requester side handle: it implements [RSocket] by starting operations on
//!  new streams. Requests from the peer are handled by the responder that the
//!  [ConnectionAcceptor] provides.

use std::future::Future;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{oneshot, watch};
use tracing::info;
use crate::buffer_pool::BufferPool;
use crate::config::RSocketConfig;
use crate::error::RSocketError;
use crate::frame::{Frame, FrameBody};
use crate::limiter::RequestStrategy;
use crate::operation::{OperationInbound, OperationOutbound, RequesterFireAndForget, RequesterRequestChannel, RequesterRequestResponse, RequesterRequestStream, StreamHandles};
use crate::payload::Payload;
use crate::rsocket::{EmptyResponder, RSocket};
use crate::streams::PayloadStream;
use crate::termination::Termination;
use crate::transport::Transport;
use crate::connection::keep_alive::KeepAlive;
use crate::connection::prioritizer::PrioritizerQueue;
use crate::connection::streams_storage::StreamsStorage;

pub mod prioritizer;
pub mod streams_storage;
mod connector;
mod driver;
mod frame_sender;
mod interceptor;
mod keep_alive;
mod reconnect;
mod setup;

pub use connector::{RSocketConnector, RSocketServer};
pub use frame_sender::FrameSender;
pub use interceptor::{AcceptorInterceptor, Interceptors, RSocketInterceptor};
pub use reconnect::{ConnectionFactory, ReconnectPredicate, ReconnectState, ReconnectableRSocket};
pub use setup::{ConnectionAcceptor, ConnectionSetup};

/// initial capacity of pooled encode buffers, most frames fit
const ENCODE_BUFFER_SIZE: usize = 1024;

/// A handle on a client or server connection, cloning is cheap.
///
/// The connection keeps running until it is closed (locally, by the peer or by a failure), even
///  if all handles are dropped.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    is_client: bool,
    setup: ConnectionSetup,
    request_strategy: RequestStrategy,
    storage: StreamsStorage,
    sender: FrameSender,
    buffer_pool: Arc<BufferPool>,
    keep_alive: KeepAlive,
    /// replaced by an [EmptyResponder] on termination: responders often hold a handle on the
    ///  connection
    responder: Mutex<Arc<dyn RSocket>>,
    interceptors: Arc<Interceptors>,
    termination: watch::Sender<Option<RSocketError>>,
    close_requested: Termination,
}

impl Connection {
    /// Creates a connection that is not running yet, see [Connection::start]
    fn new(is_client: bool, config: &RSocketConfig, setup: ConnectionSetup, interceptors: Arc<Interceptors>) -> (Connection, PrioritizerQueue) {
        let (prioritizer, queue) = prioritizer::prioritizer(config.frame_queue_capacity);
        let buffer_pool = Arc::new(BufferPool::new(ENCODE_BUFFER_SIZE, config.buffer_pool_size));

        let connection = Connection {
            inner: Arc::new(ConnectionInner {
                is_client,
                keep_alive: KeepAlive::new(setup.keep_alive_interval, setup.keep_alive_max_lifetime),
                setup,
                request_strategy: config.request_strategy,
                storage: StreamsStorage::new(is_client),
                sender: FrameSender::new(prioritizer, buffer_pool.clone(), config.max_fragment_size),
                buffer_pool,
                responder: Mutex::new(Arc::new(EmptyResponder)),
                interceptors,
                termination: watch::Sender::new(None),
                close_requested: Termination::new(),
            }),
        };
        (connection, queue)
    }

    /// `responder` is wrapped in the responder interceptors
    fn start(&self, transport: Arc<dyn Transport>, queue: PrioritizerQueue, responder: Arc<dyn RSocket>) {
        *self.inner.responder.lock().unwrap() = self.inner.interceptors.intercept_responder(responder);
        info!("{} connection established: {:?}", self.role(), self.inner.setup);
        tokio::spawn(driver::run(self.clone(), transport, queue));
    }

    fn role(&self) -> &'static str {
        if self.inner.is_client { "client" } else { "server" }
    }

    pub fn setup(&self) -> &ConnectionSetup {
        &self.inner.setup
    }

    pub fn is_client(&self) -> bool {
        self.inner.is_client
    }

    /// This connection wrapped in the requester interceptors of its connector or server. This is
    ///  also the requester that the [ConnectionAcceptor] receives.
    pub fn requester(&self) -> Arc<dyn RSocket> {
        self.inner.interceptors.intercept_requester(Arc::new(self.clone()))
    }

    pub fn is_active(&self) -> bool {
        self.inner.termination.borrow().is_none()
    }

    /// The number of streams that are currently open in either direction
    pub fn num_active_streams(&self) -> usize {
        self.inner.storage.len()
    }

    /// Closes the connection, notifying the peer. Streams that are still open fail.
    pub fn close(&self) {
        self.inner.close_requested.terminate();
    }

    /// Waits for the connection to terminate and returns the cause
    pub async fn closed(&self) -> RSocketError {
        let mut termination = self.inner.termination.subscribe();
        // the sender lives in self, so the channel can not be closed while we wait
        let cause = match termination.wait_for(Option::is_some).await {
            Ok(cause) => (*cause).clone().unwrap_or_else(RSocketError::connection_closed),
            Err(_) => RSocketError::connection_closed(),
        };
        cause
    }

    fn termination_cause(&self) -> Option<RSocketError> {
        self.inner.termination.borrow().clone()
    }

    fn responder(&self) -> Arc<dyn RSocket> {
        self.inner.responder.lock().unwrap().clone()
    }

    /// Registers a locally initiated operation and runs it in a separate task that removes the
    ///  stream when the operation is done
    fn start_requester<O, F, Fut>(&self, operation: Arc<O>, execute: F) -> Result<u32, RSocketError>
    where
        O: OperationInbound + 'static,
        F: FnOnce(Arc<O>, OperationOutbound) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stream_id = self.inner.storage.create_stream(operation.clone())?;
        let execution = execute(operation, OperationOutbound::new(stream_id, self.inner.sender.clone()));

        let inner = self.inner.clone();
        tokio::spawn(async move {
            execution.await;
            inner.storage.remove(stream_id);
        });
        Ok(stream_id)
    }
}

#[async_trait]
impl RSocket for Connection {
    async fn metadata_push(&self, metadata: Bytes) -> Result<(), RSocketError> {
        if let Some(cause) = self.termination_cause() {
            return Err(cause);
        }
        self.inner.sender.send_frame(Frame::new(0, FrameBody::MetadataPush(metadata))).await
    }

    async fn fire_and_forget(&self, payload: Payload) -> Result<(), RSocketError> {
        let (result_tx, result_rx) = oneshot::channel();
        self.start_requester(Arc::new(RequesterFireAndForget), move |operation, outbound| async move {
            let _ = result_tx.send(operation.execute(&outbound, payload).await);
        })?;

        result_rx.await
            .unwrap_or_else(|_| Err(RSocketError::connection_closed()))
    }

    async fn request_response(&self, payload: Payload) -> Result<Payload, RSocketError> {
        let (operation, response) = RequesterRequestResponse::new();
        // dropping this future before the response arrives cancels the request
        let (_abandon_guard, abandoned) = oneshot::channel::<()>();
        self.start_requester(Arc::new(operation), move |operation, outbound| async move {
            operation.execute(&outbound, payload, abandoned).await;
        })?;

        response.await
            .unwrap_or_else(|_| Err(RSocketError::connection_closed()))
    }

    async fn request_stream(&self, payload: Payload) -> Result<PayloadStream, RSocketError> {
        let (operation, handles) = RequesterRequestStream::new(self.inner.request_strategy);
        let StreamHandles { stream, initial_request, request_n } = handles;
        self.start_requester(Arc::new(operation), move |operation, outbound| async move {
            operation.execute(&outbound, payload, initial_request, request_n).await;
        })?;
        Ok(stream)
    }

    async fn request_channel(&self, initial: Payload, payloads: PayloadStream) -> Result<PayloadStream, RSocketError> {
        let (operation, handles) = RequesterRequestChannel::new(self.inner.request_strategy);
        let StreamHandles { stream, initial_request, request_n } = handles;
        self.start_requester(Arc::new(operation), move |operation, outbound| async move {
            operation.execute(&outbound, initial, payloads, initial_request, request_n).await;
        })?;
        Ok(stream)
    }
}

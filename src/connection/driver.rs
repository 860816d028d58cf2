use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use anyhow::bail;
use bytes::BytesMut;
use rustc_hash::FxHashMap;
use tokio::{select, time};
use tracing::{debug, error, info, trace, warn};
use crate::connection::prioritizer::PrioritizerQueue;
use crate::connection::streams_storage::Dispatch;
use crate::connection::Connection;
use crate::error::RSocketError;
use crate::frame::{has_ignore_flag, Frame, FrameBody, FrameType, RequestFrame};
use crate::operation::{OperationInbound, OperationOutbound, ResponderFireAndForget, ResponderRequestChannel, ResponderRequestResponse, ResponderRequestStream};
use crate::payload::{Payload, PayloadAssembler};
use crate::rsocket::EmptyResponder;
use crate::transport::Transport;

/// how long a closing connection tries to get its ERROR frame to the peer
const ERROR_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a connection terminated
#[derive(Debug)]
enum Cause {
    /// decided locally: the peer is notified with an ERROR frame on stream 0
    Local(RSocketError),
    /// the peer closed the connection, sent an ERROR on stream 0, or the transport failed
    Remote(RSocketError),
}

/// Drives a started connection until it terminates, then fails all streams and closes the
///  transport
pub async fn run(connection: Connection, transport: Arc<dyn Transport>, mut queue: PrioritizerQueue) {
    let inner = &connection.inner;

    let cause = select! {
        cause = send_loop(&connection, transport.as_ref(), &mut queue) => cause,
        cause = receive_loop(&connection, transport.as_ref()) => cause,
        cause = inner.keep_alive.run(&inner.sender) => Cause::Local(cause),
        _ = inner.close_requested.wait() => Cause::Local(RSocketError::ConnectionClose("connection closed locally".to_string())),
    };

    terminate(&connection, transport.as_ref(), &mut queue, cause).await;
}

async fn terminate(connection: &Connection, transport: &dyn Transport, queue: &mut PrioritizerQueue, cause: Cause) {
    let inner = &connection.inner;

    let cause = match cause {
        Cause::Local(cause) => {
            debug!("notifying peer: {}", cause);
            send_error_frame(transport, &cause).await;
            cause
        }
        Cause::Remote(cause) => cause,
    };

    let num_failed = inner.storage.cleanup(cause.clone());
    let num_dropped = queue.close();
    transport.close();
    // break the cycle between the connection and a responder that holds it
    *inner.responder.lock().unwrap() = Arc::new(EmptyResponder);
    inner.termination.send_replace(Some(cause.clone()));

    info!("{} connection closed ({} streams failed, {} queued frames dropped): {}", connection.role(), num_failed, num_dropped, cause);
}

/// Sends an ERROR frame on stream 0 directly through the transport, bypassing the send queue.
///  This is best effort: the transport may be broken, or the peer may not read anymore.
pub(super) async fn send_error_frame(transport: &dyn Transport, cause: &RSocketError) {
    let mut buf = BytesMut::new();
    if let Err(e) = Frame::error(0, cause).ser(&mut buf) {
        warn!("failed to encode connection error: {}", e);
        return;
    }
    match time::timeout(ERROR_FRAME_TIMEOUT, transport.send_frame(&buf)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("failed to send connection error: {}", e),
        Err(_) => debug!("timeout sending connection error"),
    }
}

async fn send_loop(connection: &Connection, transport: &dyn Transport, queue: &mut PrioritizerQueue) -> Cause {
    let buffer_pool = &connection.inner.buffer_pool;
    loop {
        let Some(buf) = queue.dequeue_frame().await else {
            // the connection itself holds a producer, so this should not happen
            error!("send queue terminated unexpectedly");
            return Cause::Remote(RSocketError::connection_closed());
        };

        let result = transport.send_frame(&buf).await;
        buffer_pool.return_to_pool(buf);
        if let Err(e) = result {
            return Cause::Remote(RSocketError::ConnectionError(format!("sending failed: {:#}", e)));
        }
    }
}

/// A peer initiated request whose payload is still arriving in fragments
struct PendingRequest {
    frame_type: FrameType,
    initial_request: u32,
    assembler: PayloadAssembler,
}

async fn receive_loop(connection: &Connection, transport: &dyn Transport) -> Cause {
    let mut pending_requests = FxHashMap::default();

    loop {
        let buf = match transport.receive_frame().await {
            Ok(Some(buf)) => buf,
            Ok(None) => return Cause::Remote(RSocketError::ConnectionClose("peer closed the connection".to_string())),
            Err(e) => return Cause::Remote(RSocketError::ConnectionError(format!("receiving failed: {:#}", e))),
        };

        let frame = match Frame::deser(&mut buf.clone()) {
            Ok(frame) => frame,
            Err(e) => {
                if has_ignore_flag(&buf) {
                    debug!("ignoring undecodable frame: {}", e);
                    continue;
                }
                warn!("received undecodable frame: {}", e);
                return Cause::Local(RSocketError::ConnectionError(format!("undecodable frame: {:#}", e)));
            }
        };
        trace!("received {}", frame);

        let result = if frame.stream_id == 0 {
            if let FrameBody::Error(error) = &frame.body {
                return Cause::Remote(error.to_error(0));
            }
            on_connection_frame(connection, frame).await
        }
        else {
            on_stream_frame(connection, frame, &mut pending_requests)
        };

        if let Err(e) = result {
            warn!("protocol violation: {:#}", e);
            return Cause::Local(RSocketError::from_internal(e));
        }
    }
}

async fn on_connection_frame(connection: &Connection, frame: Frame) -> anyhow::Result<()> {
    let inner = &connection.inner;
    let frame_type = frame.frame_type();

    match frame.body {
        FrameBody::KeepAlive(keep_alive) => {
            inner.keep_alive.received(keep_alive.respond);
            if keep_alive.respond {
                trace!("answering keep-alive");
                inner.sender.send_frame(Frame::keep_alive(false, keep_alive.data)).await?;
            }
        }
        FrameBody::MetadataPush(metadata) => {
            let responder = connection.responder();
            tokio::spawn(async move {
                if let Err(e) = responder.metadata_push(metadata).await {
                    debug!("metadata push failed: {}", e);
                }
            });
        }
        FrameBody::Lease(_) => bail!("lease is not supported"),
        FrameBody::Extension(extension) if extension.ignore => {
            debug!("ignoring extension frame {:#x}", extension.extended_type);
        }
        _ => bail!("{} frame is not valid on stream 0", frame_type.name()),
    }
    Ok(())
}

fn on_stream_frame(connection: &Connection, frame: Frame, pending_requests: &mut FxHashMap<u32, PendingRequest>) -> anyhow::Result<()> {
    let stream_id = frame.stream_id;

    if pending_requests.contains_key(&stream_id) {
        return on_request_fragment(connection, frame, pending_requests);
    }

    match connection.inner.storage.dispatch(frame)? {
        Dispatch::Delivered | Dispatch::Dropped => Ok(()),
        Dispatch::NewStream(frame) => {
            let FrameBody::Request(request) = frame.body else {
                bail!("stream {}: not a request", stream_id);
            };
            connection.inner.storage.reserve_peer_stream_id(stream_id);

            if request.follows {
                trace!("stream {}: receiving fragmented {}", stream_id, request.frame_type.name());
                let mut assembler = PayloadAssembler::new();
                assembler.append_fragment(request.payload);
                pending_requests.insert(stream_id, PendingRequest {
                    frame_type: request.frame_type,
                    initial_request: request.initial_request,
                    assembler,
                });
                return Ok(());
            }
            start_responder(connection, stream_id, request.frame_type, request.initial_request, request.complete, request.payload)
        }
    }
}

fn on_request_fragment(connection: &Connection, frame: Frame, pending_requests: &mut FxHashMap<u32, PendingRequest>) -> anyhow::Result<()> {
    let stream_id = frame.stream_id;
    let frame_type = frame.frame_type();

    match frame.body {
        FrameBody::Request(RequestFrame { frame_type: FrameType::Payload, follows, complete, next: true, payload, .. }) => {
            if follows {
                if let Some(pending) = pending_requests.get_mut(&stream_id) {
                    pending.assembler.append_fragment(payload);
                }
                return Ok(());
            }
            let Some(mut pending) = pending_requests.remove(&stream_id) else {
                return Ok(());
            };
            let payload = pending.assembler.assemble_payload(payload);
            start_responder(connection, stream_id, pending.frame_type, pending.initial_request, complete, payload)
        }
        FrameBody::Cancel => {
            debug!("stream {}: request cancelled while its fragments were arriving", stream_id);
            pending_requests.remove(&stream_id);
            Ok(())
        }
        FrameBody::Extension(_) => Ok(()),
        _ => bail!("stream {}: {} while a fragmented request is arriving", stream_id, frame_type.name()),
    }
}

/// Registers an operation for a request from the peer and runs it in a separate task
fn start_responder(connection: &Connection, stream_id: u32, frame_type: FrameType, initial_request: u32, complete: bool, payload: Payload) -> anyhow::Result<()> {
    let inner = &connection.inner;
    let responder = connection.responder();
    let outbound = OperationOutbound::new(stream_id, inner.sender.clone());
    debug!("stream {}: received {}", stream_id, frame_type.name());

    match frame_type {
        FrameType::RequestFnF => {
            let operation = Arc::new(ResponderFireAndForget::new());
            spawn_responder(connection, stream_id, operation.clone(), async move {
                operation.execute(stream_id, responder, payload).await;
            })
        }
        FrameType::RequestResponse => {
            let operation = Arc::new(ResponderRequestResponse::new());
            spawn_responder(connection, stream_id, operation.clone(), async move {
                operation.execute(&outbound, responder, payload).await;
            })
        }
        FrameType::RequestStream => {
            let operation = Arc::new(ResponderRequestStream::new(initial_request));
            spawn_responder(connection, stream_id, operation.clone(), async move {
                operation.execute(&outbound, responder, payload).await;
            })
        }
        FrameType::RequestChannel => {
            let (operation, handles) = ResponderRequestChannel::new(initial_request, complete, inner.request_strategy);
            let operation = Arc::new(operation);
            spawn_responder(connection, stream_id, operation.clone(), async move {
                operation.execute(&outbound, responder, payload, handles).await;
            })
        }
        _ => bail!("stream {}: {} is not a request", stream_id, frame_type.name()),
    }
}

fn spawn_responder(connection: &Connection, stream_id: u32, operation: Arc<dyn OperationInbound>, execution: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
    connection.inner.storage.accept_stream(stream_id, operation)?;

    let inner = connection.inner.clone();
    tokio::spawn(async move {
        execution.await;
        inner.storage.remove(stream_id);
    });
    Ok(())
}

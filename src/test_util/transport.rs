use std::sync::Arc;
use std::time::Duration;
use bytes::BytesMut;
use tokio::time;
use crate::config::RSocketConfig;
use crate::connection::{Connection, ConnectionAcceptor, ConnectionSetup, RSocketConnector, RSocketServer};
use crate::error::RSocketError;
use crate::frame::{Frame, FrameBody, SetupFrame};
use crate::rsocket::RSocket;
use crate::transport::local::{local_transport_pair, LocalTransport};
use crate::transport::Transport;

/// The far end of a connection under test, sending and receiving individual frames without any
///  protocol logic
pub struct RawPeer {
    transport: LocalTransport,
}

impl RawPeer {
    pub async fn send(&self, frame: Frame) {
        let mut buf = BytesMut::new();
        frame.ser(&mut buf).expect("frame can not be encoded");
        self.transport.send_frame(&buf).await.expect("sending failed");
    }

    /// Waits for the next frame, failing the test if none arrives
    pub async fn receive(&mut self) -> Frame {
        let mut buf = time::timeout(Duration::from_secs(5), self.transport.receive_frame()).await
            .expect("no frame was received")
            .expect("receiving failed")
            .expect("transport was closed");
        Frame::deser(&mut buf).expect("received frame can not be decoded")
    }

    /// Returns a frame that was sent already, without waiting. `None` if there is none, or if
    ///  the connection was closed.
    pub async fn try_receive(&mut self) -> Option<Frame> {
        match time::timeout(Duration::ZERO, self.transport.receive_frame()).await {
            Ok(Ok(Some(mut buf))) => Some(Frame::deser(&mut buf).expect("received frame can not be decoded")),
            _ => None,
        }
    }
}

pub fn raw_peer() -> (Arc<dyn Transport>, RawPeer) {
    let (a, b) = local_transport_pair(64);
    (Arc::new(a), RawPeer { transport: b })
}

/// A client connection whose 'server' is a [RawPeer]. The SETUP frame is left for the test to
///  receive.
pub async fn raw_server(client_config: RSocketConfig) -> (Connection, RawPeer) {
    let (transport, peer) = raw_peer();
    let client = RSocketConnector::new(client_config).connect_transport(transport).await
        .expect("connecting failed");
    (client, peer)
}

/// Sends `setup` from a [RawPeer] 'client' and has a server accept it
pub async fn raw_client(setup: SetupFrame, acceptor: Arc<dyn ConnectionAcceptor>) -> (RawPeer, Result<Connection, RSocketError>) {
    let (transport, peer) = raw_peer();
    peer.send(Frame::new(0, FrameBody::Setup(setup))).await;

    let server = RSocketServer::new(RSocketConfig::new(), acceptor).accept(transport).await;
    (peer, server)
}

/// A client and a server connection talking to each other, the server using `responder`
pub async fn connected_pair(client_config: RSocketConfig, server_config: RSocketConfig, responder: Arc<dyn RSocket>) -> (Connection, Connection) {
    let (client_transport, server_transport) = local_transport_pair(64);

    let client = RSocketConnector::new(client_config).connect_transport(Arc::new(client_transport)).await
        .expect("connecting failed");

    let acceptor: Arc<dyn ConnectionAcceptor> = Arc::new(move |_: &ConnectionSetup, _: Arc<dyn RSocket>| Ok(responder.clone()));
    let server = RSocketServer::new(server_config, acceptor).accept(Arc::new(server_transport)).await
        .expect("accepting failed");

    (client, server)
}

use std::sync::Arc;
use bytes::BytesMut;
use tracing::{debug, warn};
use crate::config::RSocketConfig;
use crate::connection::driver::send_error_frame;
use crate::connection::{Connection, ConnectionAcceptor, ConnectionSetup, Interceptors};
use crate::error::RSocketError;
use crate::frame::Frame;
use crate::rsocket::{EmptyResponder, RSocket};
use crate::transport::{ClientTransport, Transport};

/// Establishes client connections
#[derive(Clone)]
pub struct RSocketConnector {
    config: Arc<RSocketConfig>,
    acceptor: Option<Arc<dyn ConnectionAcceptor>>,
    interceptors: Arc<Interceptors>,
}

impl RSocketConnector {
    /// A connector without responder: requests from the server are rejected
    pub fn new(config: RSocketConfig) -> RSocketConnector {
        RSocketConnector {
            config: Arc::new(config),
            acceptor: None,
            interceptors: Arc::new(Interceptors::new()),
        }
    }

    /// The acceptor provides the responder for requests from the server
    pub fn with_acceptor(config: RSocketConfig, acceptor: Arc<dyn ConnectionAcceptor>) -> RSocketConnector {
        RSocketConnector {
            config: Arc::new(config),
            acceptor: Some(acceptor),
            interceptors: Arc::new(Interceptors::new()),
        }
    }

    /// The acceptor interceptors wrap the acceptor once, here
    pub fn with_interceptors(mut self, interceptors: Interceptors) -> RSocketConnector {
        self.acceptor = self.acceptor.map(|acceptor| interceptors.intercept_acceptor(acceptor));
        self.interceptors = Arc::new(interceptors);
        self
    }

    pub fn config(&self) -> &RSocketConfig {
        &self.config
    }

    pub async fn connect(&self, transport: &dyn ClientTransport) -> Result<Connection, RSocketError> {
        let transport = transport.connect().await
            .map_err(|e| RSocketError::ConnectionError(format!("connecting failed: {:#}", e)))?;
        self.connect_transport(transport).await
    }

    /// Sends SETUP over an established transport and starts the connection
    pub async fn connect_transport(&self, transport: Arc<dyn Transport>) -> Result<Connection, RSocketError> {
        self.config.validate()
            .map_err(|e| RSocketError::InvalidSetup(format!("{:#}", e)))?;

        let setup = ConnectionSetup::from_config(&self.config);
        let (connection, queue) = Connection::new(true, &self.config, setup, self.interceptors.clone());

        let responder = match &self.acceptor {
            Some(acceptor) => match acceptor.accept(connection.setup(), connection.requester()).await {
                Ok(responder) => responder,
                Err(e) => {
                    transport.close();
                    return Err(e);
                }
            },
            None => Arc::new(EmptyResponder) as Arc<dyn RSocket>,
        };

        // SETUP goes out before anything else, so it bypasses the send queue
        let mut buf = BytesMut::new();
        connection.setup().to_frame().ser(&mut buf)
            .map_err(|e| RSocketError::InvalidSetup(format!("{:#}", e)))?;
        if let Err(e) = transport.send_frame(&buf).await {
            transport.close();
            return Err(RSocketError::ConnectionError(format!("sending SETUP failed: {:#}", e)));
        }

        connection.start(transport, queue, responder);
        Ok(connection)
    }
}

/// Accepts server connections, each of which starts with a SETUP frame from the client
#[derive(Clone)]
pub struct RSocketServer {
    config: Arc<RSocketConfig>,
    acceptor: Arc<dyn ConnectionAcceptor>,
    interceptors: Arc<Interceptors>,
}

impl RSocketServer {
    pub fn new(config: RSocketConfig, acceptor: Arc<dyn ConnectionAcceptor>) -> RSocketServer {
        RSocketServer {
            config: Arc::new(config),
            acceptor,
            interceptors: Arc::new(Interceptors::new()),
        }
    }

    /// The acceptor interceptors wrap the acceptor once, here
    pub fn with_interceptors(mut self, interceptors: Interceptors) -> RSocketServer {
        self.acceptor = interceptors.intercept_acceptor(self.acceptor);
        self.interceptors = Arc::new(interceptors);
        self
    }

    /// Waits for the client's SETUP and starts the connection. A rejected SETUP is answered with
    ///  an ERROR frame on stream 0, and the transport is closed.
    pub async fn accept(&self, transport: Arc<dyn Transport>) -> Result<Connection, RSocketError> {
        let setup = match receive_setup(transport.as_ref()).await {
            Ok(setup) => setup,
            Err(e) => return Err(reject(transport.as_ref(), e).await),
        };
        debug!("received SETUP: {:?}", setup);

        let (connection, queue) = Connection::new(false, &self.config, setup, self.interceptors.clone());
        let responder = match self.acceptor.accept(connection.setup(), connection.requester()).await {
            Ok(responder) => responder,
            Err(e) => {
                let e = match e {
                    RSocketError::RejectedSetup(_) => e,
                    e => RSocketError::RejectedSetup(e.message().to_string()),
                };
                return Err(reject(transport.as_ref(), e).await);
            }
        };

        connection.start(transport, queue, responder);
        Ok(connection)
    }

    /// Accepts connections in separate tasks, e.g. as the callback of
    ///  [crate::transport::tcp::TcpServer::run]
    pub fn spawn_accept(&self, transport: Arc<dyn Transport>) {
        let server = self.clone();
        tokio::spawn(async move {
            if let Err(e) = server.accept(transport).await {
                debug!("connection was not established: {}", e);
            }
        });
    }
}

async fn receive_setup(transport: &dyn Transport) -> Result<ConnectionSetup, RSocketError> {
    let mut buf = match transport.receive_frame().await {
        Ok(Some(buf)) => buf,
        Ok(None) => return Err(RSocketError::ConnectionClose("closed before SETUP".to_string())),
        Err(e) => return Err(RSocketError::ConnectionError(format!("receiving SETUP failed: {:#}", e))),
    };
    let frame = Frame::deser(&mut buf)
        .map_err(|e| RSocketError::InvalidSetup(format!("{:#}", e)))?;
    ConnectionSetup::from_frame(frame)
}

async fn reject(transport: &dyn Transport, e: RSocketError) -> RSocketError {
    warn!("rejecting connection: {}", e);
    // nothing to tell a peer that is gone
    if !matches!(e, RSocketError::ConnectionClose(_) | RSocketError::ConnectionError(_)) {
        send_error_frame(transport, &e).await;
    }
    transport.close();
    e
}

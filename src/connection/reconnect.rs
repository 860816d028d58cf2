use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};
use crate::connection::{Connection, RSocketConnector};
use crate::error::RSocketError;
use crate::payload::Payload;
use crate::rsocket::RSocket;
use crate::streams::PayloadStream;
use crate::transport::ClientTransport;

/// Establishes a new client connection for every attempt of a [ReconnectableRSocket]
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    async fn connect(&self) -> Result<Connection, RSocketError>;
}

#[async_trait]
impl<T: ClientTransport> ConnectionFactory for (RSocketConnector, T) {
    async fn connect(&self) -> Result<Connection, RSocketError> {
        self.0.connect(&self.1).await
    }
}

/// Decides if a [ReconnectableRSocket] tries to (re)connect after `cause`. `attempt` counts the
///  decisions since the last successful connection, starting at 0.
pub trait ReconnectPredicate: Send + Sync + 'static {
    fn should_reconnect(&self, cause: &RSocketError, attempt: u64) -> bool;
}

impl<F> ReconnectPredicate for F
where F: Fn(&RSocketError, u64) -> bool + Send + Sync + 'static
{
    fn should_reconnect(&self, cause: &RSocketError, attempt: u64) -> bool {
        self(cause, attempt)
    }
}

#[derive(Clone)]
pub enum ReconnectState {
    Connecting,
    Connected(Connection),
    /// terminal
    Failed(RSocketError),
}

/// A client that replaces its connection when it is lost, for as long as a [ReconnectPredicate]
///  agrees. Requests are delegated to the current connection and wait while a connection is
///  being established.
///
/// Streams that are open when a connection is lost fail, they are not resumed.
pub struct ReconnectableRSocket {
    state: watch::Receiver<ReconnectState>,
    supervisor: JoinHandle<()>,
}

impl ReconnectableRSocket {
    /// Returns when the first connection is established, or with the cause of the last attempt
    ///  if the predicate gave up before that
    pub async fn connect(factory: impl ConnectionFactory, predicate: impl ReconnectPredicate) -> Result<ReconnectableRSocket, RSocketError> {
        Self::connect_with_delay(factory, predicate, Duration::ZERO).await
    }

    /// Waits between attempts for `delay`, randomized to up to 1.5 times that value
    pub async fn connect_with_delay(factory: impl ConnectionFactory, predicate: impl ReconnectPredicate, delay: Duration) -> Result<ReconnectableRSocket, RSocketError> {
        let (state_tx, state_rx) = watch::channel(ReconnectState::Connecting);
        let supervisor = tokio::spawn(supervise(factory, predicate, delay, state_tx));

        let result = ReconnectableRSocket {
            state: state_rx,
            supervisor,
        };
        result.current().await?;
        Ok(result)
    }

    pub fn state(&self) -> ReconnectState {
        self.state.borrow().clone()
    }

    /// The current connection, waiting for it if a connection is being established
    pub async fn current(&self) -> Result<Connection, RSocketError> {
        let mut state = self.state.clone();
        loop {
            if let Some(result) = usable_connection(&state.borrow_and_update()) {
                return result;
            }
            if state.changed().await.is_err() {
                return Err(RSocketError::connection_closed());
            }
        }
    }

    /// Stops reconnecting and closes the current connection
    pub fn close(&self) {
        self.supervisor.abort();
        if let ReconnectState::Connected(connection) = &*self.state.borrow() {
            connection.close();
        }
    }
}

impl Drop for ReconnectableRSocket {
    fn drop(&mut self) {
        self.close();
    }
}

fn usable_connection(state: &ReconnectState) -> Option<Result<Connection, RSocketError>> {
    match state {
        // a lost connection is replaced (or the supervisor fails) shortly
        ReconnectState::Connected(connection) if connection.is_active() => Some(Ok(connection.clone())),
        ReconnectState::Connected(_) | ReconnectState::Connecting => None,
        ReconnectState::Failed(cause) => Some(Err(cause.clone())),
    }
}

async fn supervise(factory: impl ConnectionFactory, predicate: impl ReconnectPredicate, delay: Duration, state: watch::Sender<ReconnectState>) {
    let mut attempt = 0;
    loop {
        let cause = match factory.connect().await {
            Ok(connection) => {
                info!("connection established");
                attempt = 0;
                state.send_replace(ReconnectState::Connected(connection.clone()));

                let cause = connection.closed().await;
                info!("connection lost: {}", cause);
                cause
            }
            Err(cause) => {
                debug!("connection attempt failed: {}", cause);
                cause
            }
        };

        if !predicate.should_reconnect(&cause, attempt) {
            warn!("giving up reconnecting after {} attempts: {}", attempt + 1, cause);
            state.send_replace(ReconnectState::Failed(cause));
            return;
        }
        attempt += 1;
        state.send_replace(ReconnectState::Connecting);

        if !delay.is_zero() {
            // spread reconnects of many clients
            time::sleep(delay.mul_f64(1.0 + rand::random::<f64>() * 0.5)).await;
        }
    }
}

#[async_trait]
impl RSocket for ReconnectableRSocket {
    async fn metadata_push(&self, metadata: Bytes) -> Result<(), RSocketError> {
        self.current().await?.metadata_push(metadata).await
    }

    async fn fire_and_forget(&self, payload: Payload) -> Result<(), RSocketError> {
        self.current().await?.fire_and_forget(payload).await
    }

    async fn request_response(&self, payload: Payload) -> Result<Payload, RSocketError> {
        self.current().await?.request_response(payload).await
    }

    async fn request_stream(&self, payload: Payload) -> Result<PayloadStream, RSocketError> {
        self.current().await?.request_stream(payload).await
    }

    async fn request_channel(&self, initial: Payload, payloads: PayloadStream) -> Result<PayloadStream, RSocketError> {
        self.current().await?.request_channel(initial, payloads).await
    }
}

impl std::fmt::Debug for ReconnectableRSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.borrow() {
            ReconnectState::Connecting => "connecting",
            ReconnectState::Connected(_) => "connected",
            ReconnectState::Failed(_) => "failed",
        };
        write!(f, "ReconnectableRSocket({})", state)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;
    use crate::config::RSocketConfig;
    use crate::connection::{ConnectionAcceptor, ConnectionSetup, RSocketServer};
    use crate::test_util::responder::PingPongResponder;
    use crate::transport::local::{local_server, LocalServerTransport};
    use super::*;

    fn refused(i: u64) -> RSocketError {
        RSocketError::ConnectionError(format!("refused #{}", i))
    }

    /// a factory whose first `num_failures` attempts fail
    fn failing_factory(num_failures: u64, connections: Vec<Connection>) -> (MockConnectionFactory, Arc<AtomicU64>) {
        let num_attempts = Arc::new(AtomicU64::new(0));
        let connections = Mutex::new(connections);

        let mut factory = MockConnectionFactory::new();
        let counter = num_attempts.clone();
        factory.expect_connect().returning(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= num_failures {
                Err(refused(attempt))
            }
            else {
                connections.lock().unwrap().pop().ok_or_else(|| refused(attempt))
            }
        });
        (factory, num_attempts)
    }

    fn serve(server_transport: LocalServerTransport) {
        let acceptor: Arc<dyn ConnectionAcceptor> = Arc::new(|_: &ConnectionSetup, _: Arc<dyn RSocket>| Ok(Arc::new(PingPongResponder) as Arc<dyn RSocket>));
        let server = RSocketServer::new(RSocketConfig::new(), acceptor);
        tokio::spawn(async move {
            while let Some(transport) = server_transport.accept().await {
                server.spawn_accept(Arc::new(transport));
            }
        });
    }

    #[tokio::test]
    async fn test_gives_up_after_fourth_failure() {
        let (factory, num_attempts) = failing_factory(u64::MAX, Vec::new());

        let result = ReconnectableRSocket::connect(factory, |_: &RSocketError, attempt: u64| attempt < 3).await;

        assert_eq!(result.err(), Some(refused(4)));
        assert_eq!(num_attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_pending_call_sees_last_cause() {
        let (client_transport, server_transport) = local_server(16);
        serve(server_transport);
        let connection = RSocketConnector::new(RSocketConfig::new()).connect(&client_transport).await.unwrap();

        let (factory, _) = failing_factory(0, vec![connection.clone()]);
        let client = ReconnectableRSocket::connect(factory, |_: &RSocketError, attempt: u64| attempt < 3).await.unwrap();
        assert_eq!(client.request_response(Payload::from_data("ping")).await, Ok(Payload::from_data("pong")));

        // the replacement connections all fail
        connection.close();
        connection.closed().await;
        let cause = client.request_response(Payload::from_data("ping")).await;
        assert_eq!(cause, Err(refused(4)));
        assert!(matches!(client.state(), ReconnectState::Failed(_)));
    }

    #[tokio::test]
    async fn test_reconnects_after_connection_loss() {
        let (client_transport, server_transport) = local_server(16);
        serve(server_transport);

        let factory = (RSocketConnector::new(RSocketConfig::new()), client_transport);
        let client = ReconnectableRSocket::connect(factory, |_: &RSocketError, _: u64| true).await.unwrap();

        let first = client.current().await.unwrap();
        first.close();
        first.closed().await;

        assert_eq!(client.request_response(Payload::from_data("ping")).await, Ok(Payload::from_data("pong")));
        let second = client.current().await.unwrap();
        assert!(second.is_active());
        assert!(!first.is_active());
    }

    #[tokio::test]
    async fn test_predicate_sees_attempts() {
        let (factory, _) = failing_factory(2, Vec::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen2 = seen.clone();
        let result = ReconnectableRSocket::connect(factory, move |cause: &RSocketError, attempt: u64| {
            seen2.lock().unwrap().push((cause.clone(), attempt));
            attempt < 2
        }).await;

        assert_eq!(result.err(), Some(refused(3)));
        assert_eq!(*seen.lock().unwrap(), vec![(refused(1), 0), (refused(2), 1), (refused(3), 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_attempts() {
        let (factory, _) = failing_factory(u64::MAX, Vec::new());

        let start = Instant::now();
        let result = ReconnectableRSocket::connect_with_delay(factory, |_: &RSocketError, attempt: u64| attempt < 2, Duration::from_millis(100)).await;
        let elapsed = start.elapsed();

        assert!(result.is_err());
        assert!(elapsed >= Duration::from_millis(200), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(300), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_drop_closes_connection() {
        let (client_transport, server_transport) = local_server(16);
        serve(server_transport);

        let factory = (RSocketConnector::new(RSocketConfig::new()), client_transport);
        let client = ReconnectableRSocket::connect(factory, |_: &RSocketError, _: u64| true).await.unwrap();
        let connection = client.current().await.unwrap();

        drop(client);
        assert_eq!(connection.closed().await, RSocketError::ConnectionClose("connection closed locally".to_string()));
    }
}

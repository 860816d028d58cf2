use std::sync::{Arc, Mutex};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::select;
use tokio::sync::mpsc;
use tracing::debug;
use crate::termination::Termination;
use crate::transport::{ClientTransport, Transport};

/// One end of an in-process transport
pub struct LocalTransport {
    outgoing: Mutex<Option<mpsc::Sender<Bytes>>>,
    incoming: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    closed: Termination,
}

/// Creates two connected ends, each buffering up to `buffer` frames in flight
pub fn local_transport_pair(buffer: usize) -> (LocalTransport, LocalTransport) {
    let (a_tx, a_rx) = mpsc::channel(buffer);
    let (b_tx, b_rx) = mpsc::channel(buffer);
    (LocalTransport::new(a_tx, b_rx), LocalTransport::new(b_tx, a_rx))
}

impl LocalTransport {
    fn new(outgoing: mpsc::Sender<Bytes>, incoming: mpsc::Receiver<Bytes>) -> LocalTransport {
        LocalTransport {
            outgoing: Mutex::new(Some(outgoing)),
            incoming: tokio::sync::Mutex::new(incoming),
            closed: Termination::new(),
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send_frame(&self, frame: &[u8]) -> anyhow::Result<()> {
        let outgoing = match self.outgoing.lock().unwrap().as_ref() {
            Some(outgoing) => outgoing.clone(),
            None => bail!("transport is closed"),
        };

        select! {
            biased;
            _ = self.closed.wait() => bail!("transport is closed"),
            result = outgoing.send(Bytes::copy_from_slice(frame)) => result.map_err(|_| anyhow!("peer closed the transport")),
        }
    }

    async fn receive_frame(&self) -> anyhow::Result<Option<Bytes>> {
        let mut incoming = self.incoming.lock().await;
        select! {
            biased;
            _ = self.closed.wait() => bail!("transport is closed"),
            frame = incoming.recv() => Ok(frame),
        }
    }

    fn close(&self) {
        if self.closed.terminate() {
            debug!("closing local transport");
            // the peer sees the end of the stream once in-flight sends are done
            self.outgoing.lock().unwrap().take();
        }
    }
}

/// The accepting side of in-process connections, see [local_server]
pub struct LocalServerTransport {
    connections: tokio::sync::Mutex<mpsc::Receiver<LocalTransport>>,
}

impl LocalServerTransport {
    /// Returns `None` when all client transports are dropped
    pub async fn accept(&self) -> Option<LocalTransport> {
        self.connections.lock().await.recv().await
    }
}

#[derive(Clone)]
pub struct LocalClientTransport {
    server: mpsc::Sender<LocalTransport>,
    buffer: usize,
}

#[async_trait]
impl ClientTransport for LocalClientTransport {
    async fn connect(&self) -> anyhow::Result<Arc<dyn Transport>> {
        let (client, server) = local_transport_pair(self.buffer);
        self.server.send(server).await
            .map_err(|_| anyhow!("local server is not accepting connections"))?;
        Ok(Arc::new(client))
    }
}

/// An in-process 'server': each `connect()` on the client transport creates a connected pair and
///  hands one end to the server's `accept()`.
pub fn local_server(buffer: usize) -> (LocalClientTransport, LocalServerTransport) {
    let (tx, rx) = mpsc::channel(16);
    (
        LocalClientTransport { server: tx, buffer },
        LocalServerTransport { connections: tokio::sync::Mutex::new(rx) },
    )
}

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::bail;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tracing::{debug, info, warn};
use crate::frame::length_prefix::{get_frame_length, put_frame_length, LENGTH_PREFIX_SIZE};
use crate::termination::Termination;
use crate::transport::{ClientTransport, Transport};

/// A TCP connection carrying frames with a 3-byte length prefix
pub struct TcpTransport {
    reader: tokio::sync::Mutex<OwnedReadHalf>,
    /// shared with the task that shuts it down on close
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    peer_addr: SocketAddr,
    closed: Termination,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> anyhow::Result<TcpTransport> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();

        Ok(TcpTransport {
            reader: tokio::sync::Mutex::new(reader),
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            peer_addr,
            closed: Termination::new(),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

async fn read_frame(reader: &mut OwnedReadHalf) -> anyhow::Result<Option<Bytes>> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let frame_len = get_frame_length(prefix);
    let mut buf = BytesMut::zeroed(frame_len);
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf.freeze()))
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send_frame(&self, frame: &[u8]) -> anyhow::Result<()> {
        let mut prefix = Vec::with_capacity(LENGTH_PREFIX_SIZE);
        put_frame_length(&mut prefix, frame.len())?;

        let mut writer = self.writer.lock().await;
        select! {
            biased;
            _ = self.closed.wait() => bail!("transport is closed"),
            result = async {
                writer.write_all(&prefix).await?;
                writer.write_all(frame).await
            } => Ok(result?),
        }
    }

    async fn receive_frame(&self) -> anyhow::Result<Option<Bytes>> {
        let mut reader = self.reader.lock().await;
        select! {
            biased;
            _ = self.closed.wait() => bail!("transport is closed"),
            result = read_frame(&mut reader) => result,
        }
    }

    /// Fails pending sends and receives, and shuts down the write half so the peer sees EOF
    fn close(&self) {
        if !self.closed.terminate() {
            return;
        }
        debug!("closing TCP connection to {}", self.peer_addr);

        // a pending send releases the lock as soon as it sees the termination
        let writer = self.writer.clone();
        let peer_addr = self.peer_addr;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = writer.lock().await.shutdown().await {
                        debug!("error shutting down TCP connection to {}: {}", peer_addr, e);
                    }
                });
            }
            Err(_) => warn!("no runtime to shut down TCP connection to {}, it closes when dropped", peer_addr),
        }
    }
}

pub struct TcpClientTransport {
    addr: SocketAddr,
}

impl TcpClientTransport {
    pub fn new(addr: SocketAddr) -> TcpClientTransport {
        TcpClientTransport { addr }
    }
}

#[async_trait]
impl ClientTransport for TcpClientTransport {
    async fn connect(&self) -> anyhow::Result<Arc<dyn Transport>> {
        debug!("connecting to {}", self.addr);
        let stream = TcpStream::connect(self.addr).await?;
        Ok(Arc::new(TcpTransport::new(stream)?))
    }
}

pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpServer> {
        Ok(TcpServer {
            listener: TcpListener::bind(addr).await?,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn accept(&self) -> anyhow::Result<Arc<dyn Transport>> {
        let (stream, addr) = self.listener.accept().await?;
        debug!("accepted connection from {}", addr);
        Ok(Arc::new(TcpTransport::new(stream)?))
    }

    /// Accepts connections until the listener fails, handing each one to `on_transport`
    pub async fn run(self, on_transport: impl Fn(Arc<dyn Transport>) + Send + Sync + 'static) -> anyhow::Result<()> {
        info!("accepting connections on {:?}", self.listener.local_addr());
        loop {
            let (stream, addr) = self.listener.accept().await?;
            match TcpTransport::new(stream) {
                Ok(transport) => {
                    debug!("accepted connection from {}", addr);
                    on_transport(Arc::new(transport));
                }
                Err(e) => warn!("failed to set up connection from {}: {}", addr, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddrV4};
    use super::*;

    fn any_local_addr() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
    }

    #[tokio::test]
    async fn test_frames_over_tcp() {
        let server = TcpServer::bind(any_local_addr()).await.unwrap();
        let client = TcpClientTransport::new(server.local_addr().unwrap());

        let client_transport = client.connect().await.unwrap();
        let server_transport = server.accept().await.unwrap();

        let sender = client_transport.clone();
        let sending = tokio::spawn(async move {
            sender.send_frame(b"abc").await.unwrap();
            sender.send_frame(&[]).await.unwrap();
            sender.send_frame(&vec![7u8; 100_000]).await.unwrap();
        });

        assert_eq!(server_transport.receive_frame().await.unwrap(), Some(Bytes::from_static(b"abc")));
        assert_eq!(server_transport.receive_frame().await.unwrap(), Some(Bytes::new()));
        assert_eq!(server_transport.receive_frame().await.unwrap().unwrap().len(), 100_000);
        sending.await.unwrap();

        server_transport.send_frame(b"xyz").await.unwrap();
        assert_eq!(client_transport.receive_frame().await.unwrap(), Some(Bytes::from_static(b"xyz")));
    }

    #[tokio::test]
    async fn test_peer_disconnect() {
        let server = TcpServer::bind(any_local_addr()).await.unwrap();
        let client = TcpClientTransport::new(server.local_addr().unwrap());

        let client_transport = client.connect().await.unwrap();
        let server_transport = server.accept().await.unwrap();
        drop(client_transport);

        assert_eq!(server_transport.receive_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close() {
        let server = TcpServer::bind(any_local_addr()).await.unwrap();
        let client = TcpClientTransport::new(server.local_addr().unwrap());
        let client_transport = client.connect().await.unwrap();
        let _server_transport = server.accept().await.unwrap();

        client_transport.close();
        assert!(client_transport.receive_frame().await.is_err());
        assert!(client_transport.send_frame(b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_close_sends_eof() {
        let server = TcpServer::bind(any_local_addr()).await.unwrap();
        let client = TcpClientTransport::new(server.local_addr().unwrap());
        let client_transport = client.connect().await.unwrap();
        let server_transport = server.accept().await.unwrap();

        client_transport.send_frame(b"last").await.unwrap();
        // the client's transport is still referenced, so only the shutdown can end the stream
        client_transport.close();

        let received = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            let last = server_transport.receive_frame().await.unwrap();
            let eof = server_transport.receive_frame().await.unwrap();
            (last, eof)
        }).await.unwrap();
        assert_eq!(received, (Some(Bytes::from_static(b"last")), None));
        drop(client_transport);
    }

    #[tokio::test]
    async fn test_frame_too_long() {
        let server = TcpServer::bind(any_local_addr()).await.unwrap();
        let client = TcpClientTransport::new(server.local_addr().unwrap());
        let client_transport = client.connect().await.unwrap();

        assert!(client_transport.send_frame(&vec![0u8; 0x100_0000]).await.is_err());
    }
}

//! Transports move encoded frames between two peers, one frame at a time and in order. Framing
//!  (e.g. the length prefix on byte streams) is the transport's business.

use std::sync::Arc;
use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;

pub mod local;
pub mod tcp;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send_frame(&self, frame: &[u8]) -> anyhow::Result<()>;

    /// Returns `None` when the peer closed the transport
    async fn receive_frame(&self) -> anyhow::Result<Option<Bytes>>;

    /// Makes pending and future sends and receives fail
    fn close(&self);
}

/// Establishes client side transports, possibly repeatedly for reconnecting
#[async_trait]
pub trait ClientTransport: Send + Sync + 'static {
    async fn connect(&self) -> anyhow::Result<Arc<dyn Transport>>;
}

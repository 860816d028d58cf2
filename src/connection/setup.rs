use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use crate::config::RSocketConfig;
use crate::error::RSocketError;
use crate::frame::{Frame, FrameBody, SetupFrame, Version};
use crate::payload::Payload;
use crate::rsocket::RSocket;

/// The parameters of a connection as negotiated by the SETUP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSetup {
    pub keep_alive_interval: Duration,
    pub keep_alive_max_lifetime: Duration,
    pub data_mime_type: String,
    pub metadata_mime_type: String,
    pub payload: Payload,
}

impl ConnectionSetup {
    pub fn from_config(config: &RSocketConfig) -> ConnectionSetup {
        ConnectionSetup {
            keep_alive_interval: config.keep_alive_interval,
            keep_alive_max_lifetime: config.keep_alive_max_lifetime,
            data_mime_type: config.data_mime_type.clone(),
            metadata_mime_type: config.metadata_mime_type.clone(),
            payload: config.setup_payload.clone(),
        }
    }

    /// Durations must fit into u32 millis, see [RSocketConfig::validate]
    pub fn to_frame(&self) -> Frame {
        Frame::new(0, FrameBody::Setup(SetupFrame {
            version: Version::CURRENT,
            honor_lease: false,
            keep_alive_interval_millis: self.keep_alive_interval.as_millis() as u32,
            keep_alive_max_lifetime_millis: self.keep_alive_max_lifetime.as_millis() as u32,
            resume_token: None,
            metadata_mime_type: self.metadata_mime_type.clone(),
            data_mime_type: self.data_mime_type.clone(),
            payload: self.payload.clone(),
        }))
    }

    /// Validates the first frame a server receives on a new connection. The `Err` is what the
    ///  server sends back on stream 0 before closing the connection.
    pub fn from_frame(frame: Frame) -> Result<ConnectionSetup, RSocketError> {
        let setup = match frame.body {
            FrameBody::Setup(setup) if frame.stream_id == 0 => setup,
            FrameBody::Resume(_) => return Err(RSocketError::RejectedResume("resume is not supported".to_string())),
            _ => return Err(RSocketError::InvalidSetup(format!("expected SETUP on stream 0, received {}", frame.frame_type().name()))),
        };

        if setup.version.major != Version::CURRENT.major {
            return Err(RSocketError::InvalidSetup(format!("unsupported protocol version {}", setup.version)));
        }
        if setup.keep_alive_interval_millis == 0 || setup.keep_alive_max_lifetime_millis == 0 {
            return Err(RSocketError::InvalidSetup("keep-alive interval and max lifetime must be positive".to_string()));
        }
        if setup.honor_lease {
            return Err(RSocketError::UnsupportedSetup("lease is not supported".to_string()));
        }
        if setup.resume_token.is_some() {
            return Err(RSocketError::UnsupportedSetup("resume is not supported".to_string()));
        }

        Ok(ConnectionSetup {
            keep_alive_interval: Duration::from_millis(setup.keep_alive_interval_millis as u64),
            keep_alive_max_lifetime: Duration::from_millis(setup.keep_alive_max_lifetime_millis as u64),
            data_mime_type: setup.data_mime_type,
            metadata_mime_type: setup.metadata_mime_type,
            payload: setup.payload,
        })
    }
}

/// Provides the responder for a new connection. It is called once per connection, on the server
///  for each accepted connection and on the client before SETUP is sent.
///
/// `requester` sends requests to the peer over the new connection. An `Err` rejects the connection.
#[async_trait]
pub trait ConnectionAcceptor: Send + Sync + 'static {
    async fn accept(&self, setup: &ConnectionSetup, requester: Arc<dyn RSocket>) -> Result<Arc<dyn RSocket>, RSocketError>;
}

#[async_trait]
impl<F> ConnectionAcceptor for F
where F: Fn(&ConnectionSetup, Arc<dyn RSocket>) -> Result<Arc<dyn RSocket>, RSocketError> + Send + Sync + 'static
{
    async fn accept(&self, setup: &ConnectionSetup, requester: Arc<dyn RSocket>) -> Result<Arc<dyn RSocket>, RSocketError> {
        self(setup, requester)
    }
}

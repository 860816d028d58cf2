use std::time::Duration;
use anyhow::bail;
use crate::frame::length_prefix::MAX_FRAME_LENGTH;
use crate::limiter::RequestStrategy;
use crate::payload::Payload;

/// the smallest fragment size that leaves room for headers, initial request count and metadata
///  length with some payload
pub const MIN_FRAGMENT_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct RSocketConfig {
    /// The interval for sending KEEPALIVE frames. A client sends it to the server as part of the
    ///  SETUP frame; on the server, this is overridden by the client's value.
    pub keep_alive_interval: Duration,
    /// A connection is closed if no KEEPALIVE frame was received for this duration
    pub keep_alive_max_lifetime: Duration,

    pub data_mime_type: String,
    pub metadata_mime_type: String,
    /// sent to the server with SETUP, ignored on the server side
    pub setup_payload: Payload,

    /// The maximum size of an outgoing frame including its length prefix. Bigger payloads are
    ///  fragmented, 0 disables fragmentation.
    pub max_fragment_size: usize,

    /// how a requester asks for items of streams and channels
    pub request_strategy: RequestStrategy,

    /// The number of encoded frames that can be queued per lane for sending before producers wait
    pub frame_queue_capacity: usize,
    /// The number of encode buffers kept for reuse. Buffers in excess of this number are
    ///  discarded when they are returned, 0 disables pooling.
    pub buffer_pool_size: usize,
}

impl RSocketConfig {
    pub fn new() -> RSocketConfig {
        RSocketConfig {
            keep_alive_interval: Duration::from_secs(20),
            keep_alive_max_lifetime: Duration::from_secs(90),
            data_mime_type: "application/binary".to_string(),
            metadata_mime_type: "application/binary".to_string(),
            setup_payload: Payload::empty(),
            max_fragment_size: 0,
            request_strategy: RequestStrategy::default(),
            frame_queue_capacity: 256,
            buffer_pool_size: 64,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_keep_alive_duration("keep-alive interval", self.keep_alive_interval)?;
        validate_keep_alive_duration("keep-alive max lifetime", self.keep_alive_max_lifetime)?;
        validate_mime_type("data mime type", &self.data_mime_type)?;
        validate_mime_type("metadata mime type", &self.metadata_mime_type)?;

        if self.max_fragment_size != 0 && !(MIN_FRAGMENT_SIZE..=MAX_FRAME_LENGTH).contains(&self.max_fragment_size) {
            bail!("max fragment size must be 0 (disabled) or between {} and {}, was {}", MIN_FRAGMENT_SIZE, MAX_FRAME_LENGTH, self.max_fragment_size);
        }
        self.request_strategy.validate()?;
        if self.frame_queue_capacity == 0 {
            bail!("frame queue capacity must be positive");
        }
        Ok(())
    }
}

impl Default for RSocketConfig {
    fn default() -> Self {
        RSocketConfig::new()
    }
}

fn validate_keep_alive_duration(name: &str, duration: Duration) -> anyhow::Result<()> {
    if duration.is_zero() {
        bail!("{} must be positive", name);
    }
    if duration.as_millis() > u32::MAX as u128 {
        bail!("{} {:?} is too long", name, duration);
    }
    Ok(())
}

fn validate_mime_type(name: &str, mime_type: &str) -> anyhow::Result<()> {
    if !mime_type.is_ascii() {
        bail!("{} must be ASCII: {}", name, mime_type);
    }
    if mime_type.len() > u8::MAX as usize {
        bail!("{} is longer than {} bytes", name, u8::MAX);
    }
    Ok(())
}

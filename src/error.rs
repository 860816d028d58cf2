use anyhow::bail;
use thiserror::Error;

/// Error codes as they appear in the body of an ERROR frame
pub mod error_code {
    pub const RESERVED: u32 = 0x0000_0000;
    pub const INVALID_SETUP: u32 = 0x0000_0001;
    pub const UNSUPPORTED_SETUP: u32 = 0x0000_0002;
    pub const REJECTED_SETUP: u32 = 0x0000_0003;
    pub const REJECTED_RESUME: u32 = 0x0000_0004;
    pub const CONNECTION_ERROR: u32 = 0x0000_0101;
    pub const CONNECTION_CLOSE: u32 = 0x0000_0102;
    pub const APPLICATION_ERROR: u32 = 0x0000_0201;
    pub const REJECTED: u32 = 0x0000_0202;
    pub const CANCELED: u32 = 0x0000_0203;
    pub const INVALID: u32 = 0x0000_0204;
    pub const MIN_CUSTOM: u32 = 0x0000_0301;
    pub const MAX_CUSTOM: u32 = 0xFFFF_FFFE;
    pub const RESERVED_FOR_EXTENSION: u32 = 0xFFFF_FFFF;
}

/// The typed error surfaced to callers of requester operations and produced by responders. It
///  maps 1:1 to the error codes of ERROR frames.
///
/// The error is `Clone` because a single connection-level cause is handed to every operation
///  that is active when the connection terminates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RSocketError {
    #[error("invalid setup: {0}")]
    InvalidSetup(String),
    #[error("unsupported setup: {0}")]
    UnsupportedSetup(String),
    #[error("rejected setup: {0}")]
    RejectedSetup(String),
    #[error("rejected resume: {0}")]
    RejectedResume(String),
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("connection closed: {0}")]
    ConnectionClose(String),
    #[error("application error: {0}")]
    ApplicationError(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("canceled: {0}")]
    Canceled(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("error {code:#010x}: {message}")]
    Custom { code: u32, message: String },
}

impl RSocketError {
    pub fn custom(code: u32, message: impl Into<String>) -> anyhow::Result<RSocketError> {
        if !(error_code::MIN_CUSTOM..=error_code::MAX_CUSTOM).contains(&code) {
            bail!("custom error code {:#010x} is outside the range reserved for applications", code);
        }
        Ok(RSocketError::Custom { code, message: message.into() })
    }

    pub fn error_code(&self) -> u32 {
        use error_code::*;

        match self {
            RSocketError::InvalidSetup(_) => INVALID_SETUP,
            RSocketError::UnsupportedSetup(_) => UNSUPPORTED_SETUP,
            RSocketError::RejectedSetup(_) => REJECTED_SETUP,
            RSocketError::RejectedResume(_) => REJECTED_RESUME,
            RSocketError::ConnectionError(_) => CONNECTION_ERROR,
            RSocketError::ConnectionClose(_) => CONNECTION_CLOSE,
            RSocketError::ApplicationError(_) => APPLICATION_ERROR,
            RSocketError::Rejected(_) => REJECTED,
            RSocketError::Canceled(_) => CANCELED,
            RSocketError::Invalid(_) => INVALID,
            RSocketError::Custom { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RSocketError::InvalidSetup(msg)
            | RSocketError::UnsupportedSetup(msg)
            | RSocketError::RejectedSetup(msg)
            | RSocketError::RejectedResume(msg)
            | RSocketError::ConnectionError(msg)
            | RSocketError::ConnectionClose(msg)
            | RSocketError::ApplicationError(msg)
            | RSocketError::Rejected(msg)
            | RSocketError::Canceled(msg)
            | RSocketError::Invalid(msg) => msg,
            RSocketError::Custom { message, .. } => message,
        }
    }

    /// Setup and connection errors are only valid on stream 0, all others only on streams
    pub fn is_connection_level(&self) -> bool {
        self.error_code() < error_code::APPLICATION_ERROR
    }

    /// Interprets the code and message of a received ERROR frame. Codes that are not valid for the
    ///  frame's stream are mapped to a generic error of the right level rather than rejected.
    pub fn from_error_frame(stream_id: u32, code: u32, message: String) -> RSocketError {
        use error_code::*;

        if stream_id == 0 {
            match code {
                INVALID_SETUP => RSocketError::InvalidSetup(message),
                UNSUPPORTED_SETUP => RSocketError::UnsupportedSetup(message),
                REJECTED_SETUP => RSocketError::RejectedSetup(message),
                REJECTED_RESUME => RSocketError::RejectedResume(message),
                CONNECTION_CLOSE => RSocketError::ConnectionClose(message),
                _ => RSocketError::ConnectionError(message),
            }
        }
        else {
            match code {
                REJECTED => RSocketError::Rejected(message),
                CANCELED => RSocketError::Canceled(message),
                INVALID => RSocketError::Invalid(message),
                MIN_CUSTOM..=MAX_CUSTOM => RSocketError::Custom { code, message },
                _ => RSocketError::ApplicationError(message),
            }
        }
    }

    /// The error as it should be sent in an ERROR frame on a (non-zero) stream: connection-level
    ///  codes are not allowed there, so they are downgraded to an application error.
    pub fn for_stream(self) -> RSocketError {
        if self.is_connection_level() {
            RSocketError::ApplicationError(self.message().to_string())
        }
        else {
            self
        }
    }

    /// Internal failures travel as `anyhow::Error`. If one of them wraps an `RSocketError`, that is
    ///  the error the peer / caller should see; anything else is a generic connection error.
    pub fn from_internal(e: anyhow::Error) -> RSocketError {
        match e.downcast::<RSocketError>() {
            Ok(e) => e,
            Err(e) => RSocketError::ConnectionError(format!("{:#}", e)),
        }
    }

    pub fn connection_closed() -> RSocketError {
        RSocketError::ConnectionClose("connection is closed".to_string())
    }
}

use std::fmt::{Display, Formatter};
use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut, Bytes};
use crate::error::RSocketError;
use crate::payload::Payload;

mod flags;
mod frame_type;
pub mod length_prefix;

pub use flags::FrameFlags;
pub use frame_type::FrameType;

/// size of the header shared by all frames: stream id (u32) and type / flags (u16)
pub const HEADER_SIZE: usize = 6;

/// size of the length prefix for metadata inside a payload
pub const METADATA_LENGTH_SIZE: usize = 3;
pub const MAX_METADATA_LENGTH: usize = 0xFF_FFFF;

pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const CURRENT: Version = Version { major: 1, minor: 0 };
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupFrame {
    pub version: Version,
    pub honor_lease: bool,
    pub keep_alive_interval_millis: u32,
    pub keep_alive_max_lifetime_millis: u32,
    pub resume_token: Option<Bytes>,
    pub metadata_mime_type: String,
    pub data_mime_type: String,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseFrame {
    pub ttl_millis: u32,
    pub number_of_requests: u32,
    pub metadata: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAliveFrame {
    pub respond: bool,
    pub last_position: u64,
    pub data: Bytes,
}

/// The four request frames and PAYLOAD frames share their layout: an optional initial request
///  count followed by a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub frame_type: FrameType,
    pub follows: bool,
    pub complete: bool,
    pub next: bool,
    /// only encoded for REQUEST_STREAM and REQUEST_CHANNEL
    pub initial_request: u32,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFrame {
    pub code: u32,
    pub data: Bytes,
}

impl ErrorFrame {
    pub fn message(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub fn to_error(&self, stream_id: u32) -> RSocketError {
        RSocketError::from_error_frame(stream_id, self.code, self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeFrame {
    pub version: Version,
    pub resume_token: Bytes,
    pub last_received_server_position: u64,
    pub first_available_client_position: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFrame {
    pub extended_type: u32,
    pub ignore: bool,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    Setup(SetupFrame),
    Lease(LeaseFrame),
    KeepAlive(KeepAliveFrame),
    MetadataPush(Bytes),
    Request(RequestFrame),
    RequestN(u32),
    Cancel,
    Error(ErrorFrame),
    Resume(ResumeFrame),
    ResumeOk(u64),
    Extension(ExtensionFrame),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream_id: u32,
    pub body: FrameBody,
}

impl Frame {
    pub fn new(stream_id: u32, body: FrameBody) -> Frame {
        Frame { stream_id, body }
    }

    pub fn request(stream_id: u32, frame_type: FrameType, initial_request: u32, payload: Payload) -> Frame {
        Frame::new(stream_id, FrameBody::Request(RequestFrame {
            frame_type,
            follows: false,
            complete: false,
            next: false,
            initial_request,
            payload,
        }))
    }

    pub fn payload(stream_id: u32, payload: Payload, next: bool, complete: bool) -> Frame {
        Frame::new(stream_id, FrameBody::Request(RequestFrame {
            frame_type: FrameType::Payload,
            follows: false,
            complete,
            next,
            initial_request: 0,
            payload,
        }))
    }

    pub fn request_n(stream_id: u32, n: u32) -> Frame {
        Frame::new(stream_id, FrameBody::RequestN(n))
    }

    pub fn cancel(stream_id: u32) -> Frame {
        Frame::new(stream_id, FrameBody::Cancel)
    }

    pub fn error(stream_id: u32, error: &RSocketError) -> Frame {
        Frame::new(stream_id, FrameBody::Error(ErrorFrame {
            code: error.error_code(),
            data: Bytes::copy_from_slice(error.message().as_bytes()),
        }))
    }

    pub fn keep_alive(respond: bool, data: Bytes) -> Frame {
        Frame::new(0, FrameBody::KeepAlive(KeepAliveFrame {
            respond,
            last_position: 0,
            data,
        }))
    }

    pub fn frame_type(&self) -> FrameType {
        match &self.body {
            FrameBody::Setup(_) => FrameType::Setup,
            FrameBody::Lease(_) => FrameType::Lease,
            FrameBody::KeepAlive(_) => FrameType::KeepAlive,
            FrameBody::MetadataPush(_) => FrameType::MetadataPush,
            FrameBody::Request(r) => r.frame_type,
            FrameBody::RequestN(_) => FrameType::RequestN,
            FrameBody::Cancel => FrameType::Cancel,
            FrameBody::Error(_) => FrameType::Error,
            FrameBody::Resume(_) => FrameType::Resume,
            FrameBody::ResumeOk(_) => FrameType::ResumeOk,
            FrameBody::Extension(_) => FrameType::Extension,
        }
    }

    pub fn flags(&self) -> FrameFlags {
        let mut flags = FrameFlags::empty();
        match &self.body {
            FrameBody::Setup(setup) => {
                flags.set(FrameFlags::METADATA, setup.payload.has_metadata());
                flags.set(FrameFlags::RESUME_ENABLE, setup.resume_token.is_some());
                flags.set(FrameFlags::LEASE, setup.honor_lease);
            }
            FrameBody::Lease(lease) => {
                flags.set(FrameFlags::METADATA, lease.metadata.is_some());
            }
            FrameBody::KeepAlive(keep_alive) => {
                flags.set(FrameFlags::RESPOND, keep_alive.respond);
            }
            FrameBody::MetadataPush(_) => {
                flags.insert(FrameFlags::METADATA);
            }
            FrameBody::Request(request) => {
                flags.set(FrameFlags::METADATA, request.payload.has_metadata());
                flags.set(FrameFlags::FOLLOWS, request.follows);
                flags.set(FrameFlags::COMPLETE, request.complete);
                flags.set(FrameFlags::NEXT, request.next);
            }
            FrameBody::Extension(extension) => {
                flags.set(FrameFlags::IGNORE, extension.ignore);
                flags.set(FrameFlags::METADATA, extension.payload.has_metadata());
            }
            FrameBody::RequestN(_) | FrameBody::Cancel | FrameBody::Error(_) | FrameBody::Resume(_) | FrameBody::ResumeOk(_) => {}
        }
        flags
    }

    /// Writes the frame (header and body, without a length prefix) to a buffer. This fails for
    ///  frames with fields that exceed their length prefix.
    pub fn ser(&self, buf: &mut impl BufMut) -> anyhow::Result<()> {
        if self.stream_id > MAX_STREAM_ID {
            bail!("stream id {} exceeds 31 bits", self.stream_id);
        }

        buf.put_u32(self.stream_id);
        let frame_type: u8 = self.frame_type().into();
        buf.put_u16(((frame_type as u16) << FrameFlags::TYPE_SHIFT) | self.flags().bits());

        match &self.body {
            FrameBody::Setup(setup) => {
                ser_version(setup.version, buf);
                buf.put_u32(setup.keep_alive_interval_millis);
                buf.put_u32(setup.keep_alive_max_lifetime_millis);
                if let Some(token) = &setup.resume_token {
                    let len: u16 = token.len().try_into()
                        .map_err(|_| anyhow!("resume token is longer than {} bytes", u16::MAX))?;
                    buf.put_u16(len);
                    buf.put_slice(token);
                }
                ser_mime_type(&setup.metadata_mime_type, buf)?;
                ser_mime_type(&setup.data_mime_type, buf)?;
                ser_payload(&setup.payload, buf)?;
            }
            FrameBody::Lease(lease) => {
                buf.put_u32(lease.ttl_millis);
                buf.put_u32(lease.number_of_requests);
                if let Some(metadata) = &lease.metadata {
                    buf.put_slice(metadata);
                }
            }
            FrameBody::KeepAlive(keep_alive) => {
                buf.put_u64(keep_alive.last_position);
                buf.put_slice(&keep_alive.data);
            }
            FrameBody::MetadataPush(metadata) => {
                buf.put_slice(metadata);
            }
            FrameBody::Request(request) => {
                if request.frame_type.has_initial_request() {
                    buf.put_u32(request.initial_request);
                }
                ser_payload(&request.payload, buf)?;
            }
            FrameBody::RequestN(n) => {
                buf.put_u32(*n);
            }
            FrameBody::Cancel => {}
            FrameBody::Error(error) => {
                buf.put_u32(error.code);
                buf.put_slice(&error.data);
            }
            FrameBody::Resume(resume) => {
                ser_version(resume.version, buf);
                let len: u16 = resume.resume_token.len().try_into()
                    .map_err(|_| anyhow!("resume token is longer than {} bytes", u16::MAX))?;
                buf.put_u16(len);
                buf.put_slice(&resume.resume_token);
                buf.put_u64(resume.last_received_server_position);
                buf.put_u64(resume.first_available_client_position);
            }
            FrameBody::ResumeOk(last_received_client_position) => {
                buf.put_u64(*last_received_client_position);
            }
            FrameBody::Extension(extension) => {
                buf.put_u32(extension.extended_type);
                ser_payload(&extension.payload, buf)?;
            }
        }
        Ok(())
    }

    /// Reads a single frame that occupies the entire buffer. Trailing bytes after a fixed-size
    ///  body are an error, as is a buffer that ends before the body is complete.
    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<Frame> {
        check_remaining(buf.remaining(), HEADER_SIZE, "frame header")?;
        let stream_id = buf.get_u32() & MAX_STREAM_ID;
        let type_and_flags = buf.get_u16();

        let raw_type = (type_and_flags >> FrameFlags::TYPE_SHIFT) as u8;
        let frame_type = FrameType::try_from(raw_type)
            .map_err(|_| anyhow!("unknown frame type {:#04x}", raw_type))?;
        let flags = FrameFlags::from_header(type_and_flags);

        let body = match frame_type {
            FrameType::Setup => {
                check_remaining(buf.remaining(), 12, "SETUP")?;
                let version = deser_version(buf);
                let keep_alive_interval_millis = buf.get_u32();
                let keep_alive_max_lifetime_millis = buf.get_u32();
                let resume_token = if flags.contains(FrameFlags::RESUME_ENABLE) {
                    check_remaining(buf.remaining(), 2, "resume token length")?;
                    let len = buf.get_u16() as usize;
                    check_remaining(buf.remaining(), len, "resume token")?;
                    Some(buf.copy_to_bytes(len))
                }
                else {
                    None
                };
                let metadata_mime_type = deser_mime_type(buf)?;
                let data_mime_type = deser_mime_type(buf)?;
                let payload = deser_payload(flags, buf)?;

                FrameBody::Setup(SetupFrame {
                    version,
                    honor_lease: flags.contains(FrameFlags::LEASE),
                    keep_alive_interval_millis,
                    keep_alive_max_lifetime_millis,
                    resume_token,
                    metadata_mime_type,
                    data_mime_type,
                    payload,
                })
            }
            FrameType::Lease => {
                check_remaining(buf.remaining(), 8, "LEASE")?;
                let ttl_millis = buf.get_u32();
                let number_of_requests = buf.get_u32();
                let metadata = if flags.contains(FrameFlags::METADATA) {
                    Some(buf.copy_to_bytes(buf.remaining()))
                }
                else {
                    None
                };
                FrameBody::Lease(LeaseFrame { ttl_millis, number_of_requests, metadata })
            }
            FrameType::KeepAlive => {
                check_remaining(buf.remaining(), 8, "KEEPALIVE")?;
                let last_position = buf.get_u64();
                FrameBody::KeepAlive(KeepAliveFrame {
                    respond: flags.contains(FrameFlags::RESPOND),
                    last_position,
                    data: buf.copy_to_bytes(buf.remaining()),
                })
            }
            FrameType::MetadataPush => {
                FrameBody::MetadataPush(buf.copy_to_bytes(buf.remaining()))
            }
            FrameType::RequestFnF | FrameType::RequestResponse | FrameType::RequestStream | FrameType::RequestChannel | FrameType::Payload => {
                let initial_request = if frame_type.has_initial_request() {
                    check_remaining(buf.remaining(), 4, "initial request n")?;
                    buf.get_u32()
                }
                else {
                    0
                };

                let next = flags.contains(FrameFlags::NEXT);
                let complete = flags.contains(FrameFlags::COMPLETE);
                if frame_type == FrameType::Payload && !next && !complete {
                    bail!("PAYLOAD frame for stream {} has neither NEXT nor COMPLETE set", stream_id);
                }

                FrameBody::Request(RequestFrame {
                    frame_type,
                    follows: flags.contains(FrameFlags::FOLLOWS),
                    complete,
                    next,
                    initial_request,
                    payload: deser_payload(flags, buf)?,
                })
            }
            FrameType::RequestN => {
                check_remaining(buf.remaining(), 4, "REQUEST_N")?;
                FrameBody::RequestN(buf.get_u32())
            }
            FrameType::Cancel => FrameBody::Cancel,
            FrameType::Error => {
                check_remaining(buf.remaining(), 4, "ERROR")?;
                let code = buf.get_u32();
                FrameBody::Error(ErrorFrame {
                    code,
                    data: buf.copy_to_bytes(buf.remaining()),
                })
            }
            FrameType::Resume => {
                check_remaining(buf.remaining(), 6, "RESUME")?;
                let version = deser_version(buf);
                let len = buf.get_u16() as usize;
                check_remaining(buf.remaining(), len + 16, "RESUME")?;
                let resume_token = buf.copy_to_bytes(len);
                FrameBody::Resume(ResumeFrame {
                    version,
                    resume_token,
                    last_received_server_position: buf.get_u64(),
                    first_available_client_position: buf.get_u64(),
                })
            }
            FrameType::ResumeOk => {
                check_remaining(buf.remaining(), 8, "RESUME_OK")?;
                FrameBody::ResumeOk(buf.get_u64())
            }
            FrameType::Extension => {
                check_remaining(buf.remaining(), 4, "EXT")?;
                let extended_type = buf.get_u32();
                FrameBody::Extension(ExtensionFrame {
                    extended_type,
                    ignore: flags.contains(FrameFlags::IGNORE),
                    payload: deser_payload(flags, buf)?,
                })
            }
        };

        if buf.has_remaining() {
            bail!("{} trailing bytes after {} frame", buf.remaining(), frame_type.name());
        }

        Ok(Frame { stream_id, body })
    }
}

/// Checks if an (undecodable) encoded frame has its IGNORE flag set, which means that the peer
///  is fine with the frame being skipped.
pub fn has_ignore_flag(buf: &[u8]) -> bool {
    if buf.len() < HEADER_SIZE {
        return false;
    }
    let type_and_flags = u16::from_be_bytes([buf[4], buf[5]]);
    FrameFlags::from_header(type_and_flags).contains(FrameFlags::IGNORE)
}

pub(crate) fn check_remaining(remaining: usize, required: usize, what: &str) -> anyhow::Result<()> {
    if remaining < required {
        bail!("buffer ends prematurely in {}: {} bytes required, {} available", what, required, remaining);
    }
    Ok(())
}

fn ser_version(version: Version, buf: &mut impl BufMut) {
    buf.put_u16(version.major);
    buf.put_u16(version.minor);
}

fn deser_version(buf: &mut impl Buf) -> Version {
    let major = buf.get_u16();
    let minor = buf.get_u16();
    Version { major, minor }
}

fn ser_mime_type(mime_type: &str, buf: &mut impl BufMut) -> anyhow::Result<()> {
    let len: u8 = mime_type.len().try_into()
        .map_err(|_| anyhow!("mime type {} is longer than 255 bytes", mime_type))?;
    buf.put_u8(len);
    buf.put_slice(mime_type.as_bytes());
    Ok(())
}

fn deser_mime_type(buf: &mut impl Buf) -> anyhow::Result<String> {
    check_remaining(buf.remaining(), 1, "mime type length")?;
    let len = buf.get_u8() as usize;
    check_remaining(buf.remaining(), len, "mime type")?;
    let raw = buf.copy_to_bytes(len);
    Ok(String::from_utf8(raw.to_vec())?)
}

fn ser_payload(payload: &Payload, buf: &mut impl BufMut) -> anyhow::Result<()> {
    if let Some(metadata) = &payload.metadata {
        if metadata.len() > MAX_METADATA_LENGTH {
            bail!("metadata length {} exceeds the maximum of {}", metadata.len(), MAX_METADATA_LENGTH);
        }
        buf.put_uint(metadata.len() as u64, METADATA_LENGTH_SIZE);
        buf.put_slice(metadata);
    }
    buf.put_slice(&payload.data);
    Ok(())
}

fn deser_payload(flags: FrameFlags, buf: &mut impl Buf) -> anyhow::Result<Payload> {
    let metadata = if flags.contains(FrameFlags::METADATA) {
        check_remaining(buf.remaining(), METADATA_LENGTH_SIZE, "metadata length")?;
        let len = buf.get_uint(METADATA_LENGTH_SIZE) as usize;
        check_remaining(buf.remaining(), len, "metadata")?;
        Some(buf.copy_to_bytes(len))
    }
    else {
        None
    };

    Ok(Payload {
        data: buf.copy_to_bytes(buf.remaining()),
        metadata,
    })
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[stream {}, flags {:#05x}", self.frame_type().name(), self.stream_id, self.flags().bits())?;
        match &self.body {
            FrameBody::Setup(setup) => write!(f, ", v{}, keep-alive {}ms/{}ms, {:?}", setup.version, setup.keep_alive_interval_millis, setup.keep_alive_max_lifetime_millis, setup.payload)?,
            FrameBody::Lease(lease) => write!(f, ", ttl {}ms, {} requests", lease.ttl_millis, lease.number_of_requests)?,
            FrameBody::KeepAlive(keep_alive) => write!(f, ", respond: {}, {} bytes", keep_alive.respond, keep_alive.data.len())?,
            FrameBody::MetadataPush(metadata) => write!(f, ", {} bytes", metadata.len())?,
            FrameBody::Request(request) => {
                if request.frame_type.has_initial_request() {
                    write!(f, ", n={}", request.initial_request)?;
                }
                write!(f, ", {:?}", request.payload)?;
            }
            FrameBody::RequestN(n) => write!(f, ", n={}", n)?,
            FrameBody::Cancel => {}
            FrameBody::Error(error) => write!(f, ", code {:#x}: {}", error.code, error.message())?,
            FrameBody::Resume(resume) => write!(f, ", v{}", resume.version)?,
            FrameBody::ResumeOk(position) => write!(f, ", position {}", position)?,
            FrameBody::Extension(extension) => write!(f, ", type {:#x}, {:?}", extension.extended_type, extension.payload)?,
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use rstest::rstest;
    use super::*;

    fn setup(resume_token: Option<&'static str>, payload: Payload) -> Frame {
        Frame::new(0, FrameBody::Setup(SetupFrame {
            version: Version::CURRENT,
            honor_lease: false,
            keep_alive_interval_millis: 500,
            keep_alive_max_lifetime_millis: 5000,
            resume_token: resume_token.map(|s| Bytes::from_static(s.as_bytes())),
            metadata_mime_type: "message/x.rsocket.routing.v0".to_string(),
            data_mime_type: "application/json".to_string(),
            payload,
        }))
    }

    fn request(frame_type: FrameType, follows: bool, complete: bool, next: bool, initial_request: u32, payload: Payload) -> Frame {
        Frame::new(7, FrameBody::Request(RequestFrame { frame_type, follows, complete, next, initial_request, payload }))
    }

    #[rstest]
    #[case::setup_plain(setup(None, Payload::empty()))]
    #[case::setup_resume_token(setup(Some("token"), Payload::from_data("hello")))]
    #[case::setup_metadata(setup(None, Payload::with_metadata("data", "meta")))]
    #[case::setup_lease(Frame::new(0, FrameBody::Setup(SetupFrame { honor_lease: true, ..match setup(None, Payload::empty()).body { FrameBody::Setup(s) => s, _ => unreachable!() } })))]
    #[case::lease(Frame::new(0, FrameBody::Lease(LeaseFrame { ttl_millis: 1000, number_of_requests: 5, metadata: None })))]
    #[case::lease_metadata(Frame::new(0, FrameBody::Lease(LeaseFrame { ttl_millis: 1000, number_of_requests: 5, metadata: Some(Bytes::from_static(b"lm")) })))]
    #[case::keep_alive(Frame::keep_alive(true, Bytes::from_static(b"ka")))]
    #[case::keep_alive_no_respond(Frame::new(0, FrameBody::KeepAlive(KeepAliveFrame { respond: false, last_position: 123456789, data: Bytes::new() })))]
    #[case::metadata_push(Frame::new(0, FrameBody::MetadataPush(Bytes::from_static(b"push"))))]
    #[case::fnf(request(FrameType::RequestFnF, false, false, false, 0, Payload::from_data("d")))]
    #[case::response_metadata(request(FrameType::RequestResponse, false, false, false, 0, Payload::with_metadata("d", "m")))]
    #[case::response_empty_metadata(request(FrameType::RequestResponse, false, false, false, 0, Payload::with_metadata("d", "")))]
    #[case::response_follows(request(FrameType::RequestResponse, true, false, false, 0, Payload::from_data("d")))]
    #[case::stream(request(FrameType::RequestStream, false, false, false, 2, Payload::from_data("d")))]
    #[case::channel_complete(request(FrameType::RequestChannel, false, true, false, u32::MAX, Payload::empty()))]
    #[case::payload_next(request(FrameType::Payload, false, false, true, 0, Payload::from_data("n")))]
    #[case::payload_complete(request(FrameType::Payload, false, true, false, 0, Payload::empty()))]
    #[case::payload_next_complete(request(FrameType::Payload, false, true, true, 0, Payload::with_metadata("x", "y")))]
    #[case::payload_fragment(request(FrameType::Payload, true, false, true, 0, Payload::from_data(vec![9u8; 5000])))]
    #[case::request_n(Frame::request_n(3, 17))]
    #[case::cancel(Frame::cancel(5))]
    #[case::error_stream(Frame::error(5, &RSocketError::ApplicationError("boom".to_string())))]
    #[case::error_connection(Frame::error(0, &RSocketError::RejectedSetup("nope".to_string())))]
    #[case::resume(Frame::new(0, FrameBody::Resume(ResumeFrame { version: Version::CURRENT, resume_token: Bytes::from_static(b"tok"), last_received_server_position: 1, first_available_client_position: 2 })))]
    #[case::resume_ok(Frame::new(0, FrameBody::ResumeOk(42)))]
    #[case::extension(Frame::new(3, FrameBody::Extension(ExtensionFrame { extended_type: 77, ignore: true, payload: Payload::with_metadata("e", "x") })))]
    fn test_round_trip(#[case] frame: Frame) {
        let mut buf = BytesMut::new();
        frame.ser(&mut buf).unwrap();
        let encoded_len = buf.len();

        let encoded = buf.freeze();
        let decoded = Frame::deser(&mut encoded.clone()).unwrap();
        assert_eq!(decoded, frame);

        let mut reencoded = BytesMut::new();
        decoded.ser(&mut reencoded).unwrap();
        assert_eq!(reencoded.len(), encoded_len);
        assert_eq!(reencoded.freeze(), encoded);
    }

    #[test]
    fn test_header_layout() {
        let mut buf = BytesMut::new();
        request(FrameType::RequestStream, false, false, false, 2, Payload::with_metadata("d", "m"))
            .ser(&mut buf)
            .unwrap();

        assert_eq!(&buf[..], &[
            0, 0, 0, 7,
            0x06 << 2 | 0x01, 0x00,
            0, 0, 0, 2,
            0, 0, 1, b'm',
            b'd',
        ]);
    }

    #[test]
    fn test_setup_layout() {
        let mut buf = BytesMut::new();
        Frame::new(0, FrameBody::Setup(SetupFrame {
            version: Version::CURRENT,
            honor_lease: false,
            keep_alive_interval_millis: 500,
            keep_alive_max_lifetime_millis: 5000,
            resume_token: None,
            metadata_mime_type: "a".to_string(),
            data_mime_type: "bc".to_string(),
            payload: Payload::empty(),
        }))
            .ser(&mut buf)
            .unwrap();

        assert_eq!(&buf[..], &[
            0, 0, 0, 0,
            0x01 << 2, 0x00,
            0, 1, 0, 0,
            0, 0, 0x01, 0xF4,
            0, 0, 0x13, 0x88,
            1, b'a',
            2, b'b', b'c',
        ]);
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::short_header(vec![0, 0, 0, 1, 0x28])]
    #[case::reserved_type(vec![0, 0, 0, 1, 0x00, 0x00])]
    #[case::unknown_type(vec![0, 0, 0, 1, 0x3C, 0x00])]
    #[case::payload_without_next_or_complete(vec![0, 0, 0, 1, 0x28, 0x00])]
    #[case::payload_follows_only(vec![0, 0, 0, 1, 0x28, 0x80])]
    #[case::request_n_too_short(vec![0, 0, 0, 1, 0x20, 0x00, 0, 0])]
    #[case::request_n_trailing(vec![0, 0, 0, 1, 0x20, 0x00, 0, 0, 0, 1, 9])]
    #[case::cancel_trailing(vec![0, 0, 0, 1, 0x24, 0x00, 1])]
    #[case::metadata_too_long(vec![0, 0, 0, 1, 0x29, 0x20, 0, 0, 5, 1])]
    #[case::setup_truncated(vec![0, 0, 0, 0, 0x04, 0x00, 0, 1, 0, 0, 0, 0])]
    fn test_deser_invalid(#[case] raw: Vec<u8>) {
        assert!(Frame::deser(&mut Bytes::from(raw)).is_err());
    }

    #[test]
    fn test_ser_mime_type_too_long() {
        let frame = Frame::new(0, FrameBody::Setup(SetupFrame {
            version: Version::CURRENT,
            honor_lease: false,
            keep_alive_interval_millis: 1,
            keep_alive_max_lifetime_millis: 1,
            resume_token: None,
            metadata_mime_type: "x".repeat(256),
            data_mime_type: "y".to_string(),
            payload: Payload::empty(),
        }));
        assert!(frame.ser(&mut BytesMut::new()).is_err());
    }

    #[test]
    fn test_stream_id_top_bit_is_ignored() {
        let frame = Frame::deser(&mut Bytes::from_static(&[0x80, 0, 0, 3, 0x24, 0x00])).unwrap();
        assert_eq!(frame, Frame::cancel(3));
    }

    #[rstest]
    #[case::set(vec![0, 0, 0, 1, 0xFE, 0x00], true)]
    #[case::not_set(vec![0, 0, 0, 1, 0xFC, 0x00], false)]
    #[case::too_short(vec![0, 0, 2], false)]
    fn test_has_ignore_flag(#[case] raw: Vec<u8>, #[case] expected: bool) {
        assert_eq!(has_ignore_flag(&raw), expected);
    }

    #[test]
    fn test_error_frame_to_error() {
        let frame = Frame::error(3, &RSocketError::Rejected("busy".to_string()));
        match frame.body {
            FrameBody::Error(error) => assert_eq!(error.to_error(3), RSocketError::Rejected("busy".to_string())),
            _ => panic!("expected error frame"),
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Frame::request_n(3, 5).to_string(), "REQUEST_N[stream 3, flags 0x000, n=5]");
    }
}

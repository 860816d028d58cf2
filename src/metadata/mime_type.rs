use std::fmt::{Display, Formatter};
use anyhow::bail;
use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use crate::frame::check_remaining;

/// set in the first byte of an encoded mime type that is a well-known id
const WELL_KNOWN_FLAG: u8 = 0x80;
const MAX_WELL_KNOWN_ID: u8 = 0x7F;
/// custom mime types are encoded with their length - 1 in 7 bits
const MAX_CUSTOM_LENGTH: usize = 128;

/// Mime types with a compact one byte representation in composite metadata
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum WellKnownMimeType {
    ApplicationAvro = 0x00,
    ApplicationCbor = 0x01,
    ApplicationGraphql = 0x02,
    ApplicationGzip = 0x03,
    ApplicationJavascript = 0x04,
    ApplicationJson = 0x05,
    ApplicationOctetStream = 0x06,
    ApplicationPdf = 0x07,
    ApplicationThrift = 0x08,
    ApplicationProtobuf = 0x09,
    ApplicationXml = 0x0A,
    ApplicationZip = 0x0B,
    AudioAac = 0x0C,
    AudioMp3 = 0x0D,
    AudioMp4 = 0x0E,
    AudioMpeg3 = 0x0F,
    AudioMpeg = 0x10,
    AudioOgg = 0x11,
    AudioOpus = 0x12,
    AudioVorbis = 0x13,
    ImageBmp = 0x14,
    ImageGif = 0x15,
    ImageHeicSequence = 0x16,
    ImageHeic = 0x17,
    ImageHeifSequence = 0x18,
    ImageHeif = 0x19,
    ImageJpeg = 0x1A,
    ImagePng = 0x1B,
    ImageTiff = 0x1C,
    MultipartMixed = 0x1D,
    TextCss = 0x1E,
    TextCsv = 0x1F,
    TextHtml = 0x20,
    TextPlain = 0x21,
    TextXml = 0x22,
    VideoH264 = 0x23,
    VideoH265 = 0x24,
    VideoVp8 = 0x25,
    ApplicationHessian = 0x26,
    ApplicationJavaObject = 0x27,
    ApplicationCloudeventsJson = 0x28,
    ApplicationCapnProto = 0x29,
    ApplicationFlatBuffers = 0x2A,

    MessageMimeType = 0x7A,
    MessageAcceptMimeTypes = 0x7B,
    MessageAuthentication = 0x7C,
    MessageZipkin = 0x7D,
    MessageRouting = 0x7E,
    MessageCompositeMetadata = 0x7F,
}

impl WellKnownMimeType {
    pub fn id(self) -> u8 {
        self.into()
    }

    pub fn text(self) -> &'static str {
        match self {
            WellKnownMimeType::ApplicationAvro => "application/avro",
            WellKnownMimeType::ApplicationCbor => "application/cbor",
            WellKnownMimeType::ApplicationGraphql => "application/graphql",
            WellKnownMimeType::ApplicationGzip => "application/gzip",
            WellKnownMimeType::ApplicationJavascript => "application/javascript",
            WellKnownMimeType::ApplicationJson => "application/json",
            WellKnownMimeType::ApplicationOctetStream => "application/octet-stream",
            WellKnownMimeType::ApplicationPdf => "application/pdf",
            WellKnownMimeType::ApplicationThrift => "application/vnd.apache.thrift.binary",
            WellKnownMimeType::ApplicationProtobuf => "application/vnd.google.protobuf",
            WellKnownMimeType::ApplicationXml => "application/xml",
            WellKnownMimeType::ApplicationZip => "application/zip",
            WellKnownMimeType::AudioAac => "audio/aac",
            WellKnownMimeType::AudioMp3 => "audio/mp3",
            WellKnownMimeType::AudioMp4 => "audio/mp4",
            WellKnownMimeType::AudioMpeg3 => "audio/mpeg3",
            WellKnownMimeType::AudioMpeg => "audio/mpeg",
            WellKnownMimeType::AudioOgg => "audio/ogg",
            WellKnownMimeType::AudioOpus => "audio/opus",
            WellKnownMimeType::AudioVorbis => "audio/vorbis",
            WellKnownMimeType::ImageBmp => "image/bmp",
            WellKnownMimeType::ImageGif => "image/gif",
            WellKnownMimeType::ImageHeicSequence => "image/heic-sequence",
            WellKnownMimeType::ImageHeic => "image/heic",
            WellKnownMimeType::ImageHeifSequence => "image/heif-sequence",
            WellKnownMimeType::ImageHeif => "image/heif",
            WellKnownMimeType::ImageJpeg => "image/jpeg",
            WellKnownMimeType::ImagePng => "image/png",
            WellKnownMimeType::ImageTiff => "image/tiff",
            WellKnownMimeType::MultipartMixed => "multipart/mixed",
            WellKnownMimeType::TextCss => "text/css",
            WellKnownMimeType::TextCsv => "text/csv",
            WellKnownMimeType::TextHtml => "text/html",
            WellKnownMimeType::TextPlain => "text/plain",
            WellKnownMimeType::TextXml => "text/xml",
            WellKnownMimeType::VideoH264 => "video/H264",
            WellKnownMimeType::VideoH265 => "video/H265",
            WellKnownMimeType::VideoVp8 => "video/VP8",
            WellKnownMimeType::ApplicationHessian => "application/x-hessian",
            WellKnownMimeType::ApplicationJavaObject => "application/x-java-object",
            WellKnownMimeType::ApplicationCloudeventsJson => "application/cloudevents+json",
            WellKnownMimeType::ApplicationCapnProto => "application/x-capnp",
            WellKnownMimeType::ApplicationFlatBuffers => "application/x-flatbuffers",
            WellKnownMimeType::MessageMimeType => "message/x.rsocket.mime-type.v0",
            WellKnownMimeType::MessageAcceptMimeTypes => "message/x.rsocket.accept-mime-types.v0",
            WellKnownMimeType::MessageAuthentication => "message/x.rsocket.authentication.v0",
            WellKnownMimeType::MessageZipkin => "message/x.rsocket.tracing-zipkin.v0",
            WellKnownMimeType::MessageRouting => "message/x.rsocket.routing.v0",
            WellKnownMimeType::MessageCompositeMetadata => "message/x.rsocket.composite-metadata.v0",
        }
    }

    pub fn from_text(text: &str) -> Option<WellKnownMimeType> {
        (0..=MAX_WELL_KNOWN_ID)
            .filter_map(|id| WellKnownMimeType::try_from(id).ok())
            .find(|mime_type| mime_type.text() == text)
    }
}

impl Display for WellKnownMimeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// The mime type of a composite metadata entry
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum MimeType {
    WellKnown(WellKnownMimeType),
    /// a well-known id that is not (yet) assigned, passed through as is
    Reserved(u8),
    Custom(String),
}

impl MimeType {
    /// Well-known mime types are recognized by their text
    pub fn parse(text: &str) -> MimeType {
        match WellKnownMimeType::from_text(text) {
            Some(well_known) => MimeType::WellKnown(well_known),
            None => MimeType::Custom(text.to_string()),
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) -> anyhow::Result<()> {
        match self {
            MimeType::WellKnown(well_known) => buf.put_u8(well_known.id() | WELL_KNOWN_FLAG),
            MimeType::Reserved(id) => {
                if *id > MAX_WELL_KNOWN_ID {
                    bail!("mime type id {} is out of range", id);
                }
                buf.put_u8(id | WELL_KNOWN_FLAG);
            }
            MimeType::Custom(text) => {
                if text.is_empty() || text.len() > MAX_CUSTOM_LENGTH {
                    bail!("custom mime type must have 1 to {} bytes: {:?}", MAX_CUSTOM_LENGTH, text);
                }
                if !text.is_ascii() {
                    bail!("custom mime type must be ASCII: {:?}", text);
                }
                buf.put_u8((text.len() - 1) as u8);
                buf.put_slice(text.as_bytes());
            }
        }
        Ok(())
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<MimeType> {
        check_remaining(buf.remaining(), 1, "mime type")?;
        let first = buf.get_u8();
        if first & WELL_KNOWN_FLAG != 0 {
            let id = first & !WELL_KNOWN_FLAG;
            return Ok(match WellKnownMimeType::try_from(id) {
                Ok(well_known) => MimeType::WellKnown(well_known),
                Err(_) => MimeType::Reserved(id),
            });
        }

        let len = first as usize + 1;
        check_remaining(buf.remaining(), len, "mime type")?;
        let text = buf.copy_to_bytes(len);
        if !text.is_ascii() {
            bail!("custom mime type is not ASCII");
        }
        // ASCII is valid UTF-8
        Ok(MimeType::Custom(String::from_utf8_lossy(&text).into_owned()))
    }
}

impl From<WellKnownMimeType> for MimeType {
    fn from(value: WellKnownMimeType) -> Self {
        MimeType::WellKnown(value)
    }
}

impl From<&str> for MimeType {
    fn from(value: &str) -> Self {
        MimeType::parse(value)
    }
}

impl Display for MimeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MimeType::WellKnown(well_known) => write!(f, "{}", well_known),
            MimeType::Reserved(id) => write!(f, "reserved mime type 0x{:02X}", id),
            MimeType::Custom(text) => write!(f, "{}", text),
        }
    }
}

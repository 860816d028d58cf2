use std::fmt::{Display, Formatter};
use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use crate::frame::check_remaining;

const WELL_KNOWN_FLAG: u8 = 0x80;
const MAX_CUSTOM_LENGTH: usize = 0x7F;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum WellKnownAuthType {
    Simple = 0x00,
    Bearer = 0x01,
}

impl WellKnownAuthType {
    pub fn text(self) -> &'static str {
        match self {
            WellKnownAuthType::Simple => "simple",
            WellKnownAuthType::Bearer => "bearer",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum AuthType {
    WellKnown(WellKnownAuthType),
    Reserved(u8),
    Custom(String),
}

impl AuthType {
    pub fn ser(&self, buf: &mut impl BufMut) -> anyhow::Result<()> {
        match self {
            AuthType::WellKnown(well_known) => buf.put_u8(u8::from(*well_known) | WELL_KNOWN_FLAG),
            AuthType::Reserved(id) => {
                if *id >= WELL_KNOWN_FLAG {
                    bail!("auth type id {} is out of range", id);
                }
                buf.put_u8(id | WELL_KNOWN_FLAG);
            }
            AuthType::Custom(text) => {
                // unlike mime types, the length is stored as is
                if text.is_empty() || text.len() > MAX_CUSTOM_LENGTH {
                    bail!("custom auth type must have 1 to {} bytes: {:?}", MAX_CUSTOM_LENGTH, text);
                }
                if !text.is_ascii() {
                    bail!("custom auth type must be ASCII: {:?}", text);
                }
                buf.put_u8(text.len() as u8);
                buf.put_slice(text.as_bytes());
            }
        }
        Ok(())
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<AuthType> {
        check_remaining(buf.remaining(), 1, "auth type")?;
        let first = buf.get_u8();
        if first & WELL_KNOWN_FLAG != 0 {
            let id = first & !WELL_KNOWN_FLAG;
            return Ok(match WellKnownAuthType::try_from(id) {
                Ok(well_known) => AuthType::WellKnown(well_known),
                Err(_) => AuthType::Reserved(id),
            });
        }

        let len = first as usize;
        if len == 0 {
            bail!("custom auth type must not be empty");
        }
        check_remaining(buf.remaining(), len, "auth type")?;
        let text = buf.copy_to_bytes(len);
        if !text.is_ascii() {
            bail!("custom auth type is not ASCII");
        }
        Ok(AuthType::Custom(String::from_utf8_lossy(&text).into_owned()))
    }
}

impl Display for AuthType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthType::WellKnown(well_known) => write!(f, "{}", well_known.text()),
            AuthType::Reserved(id) => write!(f, "reserved auth type 0x{:02X}", id),
            AuthType::Custom(text) => write!(f, "{}", text),
        }
    }
}

/// The content of a [crate::metadata::WellKnownMimeType::MessageAuthentication] metadata entry.
///  Well-known auth types are decoded into their fields, everything else is kept as raw bytes.
#[derive(Clone, Eq, PartialEq)]
pub enum AuthMetadata {
    Simple { username: String, password: String },
    Bearer { token: String },
    Raw { auth_type: AuthType, content: Bytes },
}

impl AuthMetadata {
    pub fn simple(username: impl Into<String>, password: impl Into<String>) -> AuthMetadata {
        AuthMetadata::Simple {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> AuthMetadata {
        AuthMetadata::Bearer { token: token.into() }
    }

    pub fn auth_type(&self) -> AuthType {
        match self {
            AuthMetadata::Simple { .. } => AuthType::WellKnown(WellKnownAuthType::Simple),
            AuthMetadata::Bearer { .. } => AuthType::WellKnown(WellKnownAuthType::Bearer),
            AuthMetadata::Raw { auth_type, .. } => auth_type.clone(),
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) -> anyhow::Result<()> {
        self.auth_type().ser(buf)?;
        match self {
            AuthMetadata::Simple { username, password } => {
                let username_len = u16::try_from(username.len())
                    .map_err(|_| anyhow!("username is too long: {} bytes", username.len()))?;
                buf.put_u16(username_len);
                buf.put_slice(username.as_bytes());
                buf.put_slice(password.as_bytes());
            }
            AuthMetadata::Bearer { token } => buf.put_slice(token.as_bytes()),
            AuthMetadata::Raw { content, .. } => buf.put_slice(content),
        }
        Ok(())
    }

    /// Consumes the entire buffer
    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<AuthMetadata> {
        let auth_type = AuthType::deser(buf)?;
        match auth_type {
            AuthType::WellKnown(WellKnownAuthType::Simple) => {
                check_remaining(buf.remaining(), 2, "username length")?;
                let username_len = buf.get_u16() as usize;
                check_remaining(buf.remaining(), username_len, "username")?;
                let username = utf8(buf.copy_to_bytes(username_len), "username")?;
                let password = utf8(buf.copy_to_bytes(buf.remaining()), "password")?;
                Ok(AuthMetadata::Simple { username, password })
            }
            AuthType::WellKnown(WellKnownAuthType::Bearer) => {
                let token = utf8(buf.copy_to_bytes(buf.remaining()), "bearer token")?;
                Ok(AuthMetadata::Bearer { token })
            }
            auth_type => Ok(AuthMetadata::Raw {
                auth_type,
                content: buf.copy_to_bytes(buf.remaining()),
            }),
        }
    }

    pub fn to_bytes(&self) -> anyhow::Result<Bytes> {
        let mut buf = BytesMut::new();
        self.ser(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// credentials are not logged
impl std::fmt::Debug for AuthMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMetadata::Simple { username, .. } => write!(f, "AuthMetadata[simple, username: {}]", username),
            AuthMetadata::Bearer { .. } => write!(f, "AuthMetadata[bearer]"),
            AuthMetadata::Raw { auth_type, content } => write!(f, "AuthMetadata[{}, {} bytes]", auth_type, content.len()),
        }
    }
}

fn utf8(bytes: Bytes, what: &str) -> anyhow::Result<String> {
    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => Ok(s),
        Err(_) => bail!("{} is not valid UTF-8", what),
    }
}

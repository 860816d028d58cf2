use anyhow::bail;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::frame::check_remaining;
use crate::metadata::MimeType;

const CONTENT_LENGTH_SIZE: usize = 3;
pub const MAX_CONTENT_LENGTH: usize = 0xFF_FFFF;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CompositeEntry {
    pub mime_type: MimeType,
    pub content: Bytes,
}

/// Metadata consisting of several entries, each with its own mime type. This is the payload
///  metadata of connections with the metadata mime type
///  [crate::metadata::WellKnownMimeType::MessageCompositeMetadata].
///
/// Entries keep their order, and the same mime type may occur more than once.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CompositeMetadata {
    entries: Vec<CompositeEntry>,
}

impl CompositeMetadata {
    pub fn new() -> CompositeMetadata {
        CompositeMetadata::default()
    }

    pub fn add(&mut self, mime_type: impl Into<MimeType>, content: impl Into<Bytes>) {
        self.entries.push(CompositeEntry {
            mime_type: mime_type.into(),
            content: content.into(),
        });
    }

    pub fn with(mut self, mime_type: impl Into<MimeType>, content: impl Into<Bytes>) -> CompositeMetadata {
        self.add(mime_type, content);
        self
    }

    pub fn entries(&self) -> &[CompositeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, mime_type: impl Into<MimeType>) -> bool {
        let mime_type = mime_type.into();
        self.entries.iter().any(|e| e.mime_type == mime_type)
    }

    /// The content of the first entry with this mime type
    pub fn get(&self, mime_type: impl Into<MimeType>) -> Option<&Bytes> {
        let mime_type = mime_type.into();
        self.entries.iter()
            .find(|e| e.mime_type == mime_type)
            .map(|e| &e.content)
    }

    pub fn get_all(&self, mime_type: impl Into<MimeType>) -> Vec<&Bytes> {
        let mime_type = mime_type.into();
        self.entries.iter()
            .filter(|e| e.mime_type == mime_type)
            .map(|e| &e.content)
            .collect()
    }

    pub fn ser(&self, buf: &mut impl BufMut) -> anyhow::Result<()> {
        for entry in &self.entries {
            if entry.content.len() > MAX_CONTENT_LENGTH {
                bail!("content for {} is too long: {} bytes", entry.mime_type, entry.content.len());
            }
            entry.mime_type.ser(buf)?;
            buf.put_uint(entry.content.len() as u64, CONTENT_LENGTH_SIZE);
            buf.put_slice(&entry.content);
        }
        Ok(())
    }

    /// Reads entries until the buffer is exhausted
    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<CompositeMetadata> {
        let mut entries = Vec::new();
        while buf.has_remaining() {
            let mime_type = MimeType::deser(buf)?;
            check_remaining(buf.remaining(), CONTENT_LENGTH_SIZE, "composite metadata content length")?;
            let len = buf.get_uint(CONTENT_LENGTH_SIZE) as usize;
            check_remaining(buf.remaining(), len, "composite metadata content")?;
            entries.push(CompositeEntry {
                mime_type,
                content: buf.copy_to_bytes(len),
            });
        }
        Ok(CompositeMetadata { entries })
    }

    pub fn to_bytes(&self) -> anyhow::Result<Bytes> {
        let mut buf = BytesMut::new();
        self.ser(&mut buf)?;
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use crate::metadata::WellKnownMimeType;
    use super::*;

    #[rstest]
    #[case::empty(CompositeMetadata::new())]
    #[case::well_known(CompositeMetadata::new()
        .with(WellKnownMimeType::MessageRouting, Bytes::from_static(b"\x05hello")))]
    #[case::mixed(CompositeMetadata::new()
        .with("application/x-custom", "custom")
        .with(WellKnownMimeType::TextPlain, "plain")
        .with(MimeType::Reserved(0x60), Bytes::new()))]
    #[case::repeated(CompositeMetadata::new()
        .with(WellKnownMimeType::TextPlain, "a")
        .with(WellKnownMimeType::TextPlain, "b"))]
    fn test_ser_deser(#[case] metadata: CompositeMetadata) {
        let bytes = metadata.to_bytes().unwrap();
        let deser = CompositeMetadata::deser(&mut bytes.clone()).unwrap();
        assert_eq!(deser, metadata);
    }

    #[test]
    fn test_wire_format() {
        let metadata = CompositeMetadata::new()
            .with(WellKnownMimeType::ApplicationJson, "{}")
            .with("a/b", "x");

        assert_eq!(metadata.to_bytes().unwrap().to_vec(), vec![
            0x85, 0, 0, 2, b'{', b'}',
            2, b'a', b'/', b'b', 0, 0, 1, b'x',
        ]);
    }

    #[test]
    fn test_lookup() {
        let metadata = CompositeMetadata::new()
            .with("text/plain", "a")
            .with("application/x-custom", "c")
            .with(WellKnownMimeType::TextPlain, "b");

        // the text of a well-known mime type is stored as the well-known id
        assert_eq!(metadata.entries()[0].mime_type, MimeType::WellKnown(WellKnownMimeType::TextPlain));

        assert!(metadata.contains(WellKnownMimeType::TextPlain));
        assert!(metadata.contains("application/x-custom"));
        assert!(!metadata.contains(WellKnownMimeType::ApplicationJson));

        assert_eq!(metadata.get("text/plain"), Some(&Bytes::from_static(b"a")));
        assert_eq!(metadata.get(WellKnownMimeType::ApplicationJson), None);
        assert_eq!(metadata.get_all(WellKnownMimeType::TextPlain), vec![&Bytes::from_static(b"a"), &Bytes::from_static(b"b")]);
        assert_eq!(metadata.len(), 3);
    }

    #[rstest]
    #[case::missing_length(vec![0x85, 0, 0])]
    #[case::truncated_content(vec![0x85, 0, 0, 3, b'a'])]
    #[case::truncated_mime_type(vec![5, b'a'])]
    fn test_deser_truncated(#[case] bytes: Vec<u8>) {
        assert!(CompositeMetadata::deser(&mut Bytes::from(bytes)).is_err());
    }

    #[test]
    fn test_content_too_long() {
        let metadata = CompositeMetadata::new()
            .with(WellKnownMimeType::ApplicationOctetStream, vec![0u8; MAX_CONTENT_LENGTH + 1]);
        assert!(metadata.to_bytes().is_err());
    }
}

//! Codecs for the metadata extensions: composite metadata with its registry of well-known mime
//!  types, authentication and Zipkin tracing metadata.
//!
//! These operate on payload metadata (and the mime types negotiated in SETUP); the protocol
//!  engine itself treats metadata as opaque bytes.

mod auth;
mod composite;
mod mime_type;
mod zipkin;

pub use auth::{AuthMetadata, AuthType, WellKnownAuthType};
pub use composite::{CompositeEntry, CompositeMetadata, MAX_CONTENT_LENGTH};
pub use mime_type::{MimeType, WellKnownMimeType};
pub use zipkin::{SamplingKind, TraceIds, ZipkinTracingMetadata};

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use crate::payload::Payload;
    use super::*;

    #[test]
    fn test_composite_with_extensions() {
        let auth = AuthMetadata::bearer("token");
        let tracing = ZipkinTracingMetadata {
            kind: SamplingKind::Sample,
            ids: Some(TraceIds { trace_id_high: None, trace_id: 1, span_id: 2, parent_span_id: None }),
        };

        let metadata = CompositeMetadata::new()
            .with(WellKnownMimeType::MessageAuthentication, auth.to_bytes().unwrap())
            .with(WellKnownMimeType::MessageZipkin, tracing.to_bytes());
        let payload = Payload::with_metadata("data", metadata.to_bytes().unwrap());

        let mut received = payload.metadata.clone().unwrap();
        let decoded = CompositeMetadata::deser(&mut received).unwrap();

        let mut auth_bytes = decoded.get(WellKnownMimeType::MessageAuthentication).unwrap().clone();
        assert_eq!(AuthMetadata::deser(&mut auth_bytes).unwrap(), auth);
        let mut tracing_bytes = decoded.get(WellKnownMimeType::MessageZipkin).unwrap().clone();
        assert_eq!(ZipkinTracingMetadata::deser(&mut tracing_bytes).unwrap(), tracing);
        assert_eq!(decoded.get(WellKnownMimeType::MessageRouting), None::<&Bytes>);
    }
}

use anyhow::bail;
use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::frame::check_remaining;

bitflags! {
    #[derive(Debug, PartialEq, Eq, Copy, Clone)]
    struct ZipkinFlags: u8 {
        const HAS_IDS = 0x80;
        const DEBUG = 0x40;
        const SAMPLE = 0x20;
        const NOT_SAMPLED = 0x10;
        /// the trace id has 128 bits
        const EXTENDED_TRACE = 0x08;
        const HAS_PARENT_SPAN = 0x04;
    }
}

/// The sampling decision, see the B3 propagation headers
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SamplingKind {
    Unspecified,
    Debug,
    Sample,
    NotSampled,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TraceIds {
    /// the upper 64 bits of a 128 bit trace id
    pub trace_id_high: Option<u64>,
    pub trace_id: u64,
    pub span_id: u64,
    pub parent_span_id: Option<u64>,
}

/// The content of a [crate::metadata::WellKnownMimeType::MessageZipkin] metadata entry
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ZipkinTracingMetadata {
    pub kind: SamplingKind,
    /// may be absent to propagate only the sampling decision
    pub ids: Option<TraceIds>,
}

impl ZipkinTracingMetadata {
    fn flags(&self) -> ZipkinFlags {
        let mut flags = match self.kind {
            SamplingKind::Unspecified => ZipkinFlags::empty(),
            SamplingKind::Debug => ZipkinFlags::DEBUG,
            SamplingKind::Sample => ZipkinFlags::SAMPLE,
            SamplingKind::NotSampled => ZipkinFlags::NOT_SAMPLED,
        };
        if let Some(ids) = &self.ids {
            flags |= ZipkinFlags::HAS_IDS;
            if ids.trace_id_high.is_some() {
                flags |= ZipkinFlags::EXTENDED_TRACE;
            }
            if ids.parent_span_id.is_some() {
                flags |= ZipkinFlags::HAS_PARENT_SPAN;
            }
        }
        flags
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.flags().bits());
        if let Some(ids) = &self.ids {
            if let Some(high) = ids.trace_id_high {
                buf.put_u64(high);
            }
            buf.put_u64(ids.trace_id);
            buf.put_u64(ids.span_id);
            if let Some(parent) = ids.parent_span_id {
                buf.put_u64(parent);
            }
        }
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<ZipkinTracingMetadata> {
        check_remaining(buf.remaining(), 1, "tracing flags")?;
        let flags = ZipkinFlags::from_bits_truncate(buf.get_u8());

        // debug implies sample
        let kind = if flags.contains(ZipkinFlags::DEBUG) {
            SamplingKind::Debug
        }
        else if flags.contains(ZipkinFlags::SAMPLE) {
            SamplingKind::Sample
        }
        else if flags.contains(ZipkinFlags::NOT_SAMPLED) {
            SamplingKind::NotSampled
        }
        else {
            SamplingKind::Unspecified
        };

        if !flags.contains(ZipkinFlags::HAS_IDS) {
            if flags.intersects(ZipkinFlags::EXTENDED_TRACE | ZipkinFlags::HAS_PARENT_SPAN) {
                bail!("tracing metadata has id flags but no ids");
            }
            return Ok(ZipkinTracingMetadata { kind, ids: None });
        }

        let extended = flags.contains(ZipkinFlags::EXTENDED_TRACE);
        let has_parent = flags.contains(ZipkinFlags::HAS_PARENT_SPAN);
        let num_ids = 2 + extended as usize + has_parent as usize;
        check_remaining(buf.remaining(), 8 * num_ids, "trace ids")?;

        let trace_id_high = if extended { Some(buf.get_u64()) } else { None };
        let trace_id = buf.get_u64();
        let span_id = buf.get_u64();
        let parent_span_id = if has_parent { Some(buf.get_u64()) } else { None };

        Ok(ZipkinTracingMetadata {
            kind,
            ids: Some(TraceIds { trace_id_high, trace_id, span_id, parent_span_id }),
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.ser(&mut buf);
        buf.freeze()
    }
}

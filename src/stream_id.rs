use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::debug;
use crate::frame::MAX_STREAM_ID;

/// Issues stream ids for locally initiated streams: odd ids for the client, even ids for the
///  server. Ids wrap around after reaching the 31 bit maximum, skipping ids that are still in use.
pub struct StreamIdAllocator {
    first: u32,
    /// the next candidate id
    next: AtomicU32,
    wrapped: AtomicBool,
}

impl StreamIdAllocator {
    pub fn client() -> StreamIdAllocator {
        StreamIdAllocator::starting_at(1)
    }

    pub fn server() -> StreamIdAllocator {
        StreamIdAllocator::starting_at(2)
    }

    pub fn for_role(is_client: bool) -> StreamIdAllocator {
        if is_client {
            StreamIdAllocator::client()
        }
        else {
            StreamIdAllocator::server()
        }
    }

    fn starting_at(next: u32) -> StreamIdAllocator {
        StreamIdAllocator {
            first: 2 - (next & 1),
            next: AtomicU32::new(next),
            wrapped: AtomicBool::new(false),
        }
    }

    /// Returns the next id that `is_in_use` does not report as taken. Never returns 0.
    pub fn next(&self, is_in_use: impl Fn(u32) -> bool) -> u32 {
        loop {
            let candidate = self.next.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| Some(self.advance(cur)))
                .unwrap_or_else(|cur| cur);

            if is_in_use(candidate) {
                debug!("stream id {} is still in use, skipping", candidate);
                continue;
            }
            return candidate;
        }
    }

    fn advance(&self, cur: u32) -> u32 {
        if cur > MAX_STREAM_ID - 2 {
            self.wrapped.store(true, Ordering::Release);
            self.first
        }
        else {
            cur + 2
        }
    }

    pub fn is_own_id(&self, stream_id: u32) -> bool {
        stream_id != 0 && (stream_id & 1) == (self.first & 1)
    }

    /// Checks if an id of this allocator's parity was handed out at some point, i.e. frames for
    ///  it refer to a stream that is already finished rather than a stream that never existed.
    pub fn is_before_or_current(&self, stream_id: u32) -> bool {
        if !self.is_own_id(stream_id) {
            return false;
        }
        self.wrapped.load(Ordering::Acquire) || stream_id < self.next.load(Ordering::Acquire)
    }
}

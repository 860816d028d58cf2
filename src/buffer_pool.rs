use std::sync::Mutex;
use bytes::BytesMut;
use tracing::{debug, trace};

/// Pool of buffers for encoding outbound frames. A connection's send loop returns buffers after
///  writing them to the transport, so steady-state traffic does not allocate.
pub struct BufferPool {
    buf_size: usize,
    max_pool_size: usize,
    buffers: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    pub fn new(buf_size: usize, max_pool_size: usize) -> Self {
        BufferPool {
            buf_size,
            max_pool_size,
            buffers: Mutex::new(Vec::with_capacity(max_pool_size)),
        }
    }

    pub fn get_from_pool(&self) -> BytesMut {
        {
            let mut buffers = self.buffers.lock().unwrap();
            if let Some(buffer) = buffers.pop() {
                trace!("returning buffer from pool");
                return buffer;
            }
        }

        trace!("no buffer in pool: creating new buffer");
        BytesMut::with_capacity(self.buf_size)
    }

    pub fn return_to_pool(&self, mut buffer: BytesMut) {
        // buffers that grew for a big frame are not kept around
        if buffer.capacity() > 4 * self.buf_size {
            debug!("discarding returned buffer with capacity {}", buffer.capacity());
            return;
        }

        buffer.clear();

        let mut buffers = self.buffers.lock().unwrap();
        if buffers.len() < self.max_pool_size {
            trace!("returning buffer to pool");
            buffers.push(buffer);
        }
        else {
            trace!("pool is full: discarding returned buffer");
        }
    }

    #[cfg(test)]
    pub fn num_pooled(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }
}

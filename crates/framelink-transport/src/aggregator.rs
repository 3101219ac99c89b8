use bytes::{Bytes, BytesMut};

/// Default aggregation buffer size: 8 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Fraction of the buffer that triggers a flush.
pub const FLUSH_RATIO: f64 = 0.8;

/// Coalesces small, high-frequency reads into larger chunks.
///
/// Drivers push every read through the aggregator and forward whatever it
/// returns. Byte order is always preserved.
#[derive(Debug)]
pub struct ReadAggregator {
    buf: BytesMut,
    capacity: usize,
}

impl Default for ReadAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl ReadAggregator {
    /// Create an aggregator with the given capacity (clamped to at least one byte).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently held back.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Change the capacity. Any buffered bytes are returned first.
    pub fn set_capacity(&mut self, capacity: usize) -> Option<Bytes> {
        let pending = self.flush();
        self.capacity = capacity.max(1);
        self.buf = BytesMut::with_capacity(self.capacity);
        pending
    }

    /// Add a read. Returns the chunks that are ready to forward, in order.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        let mut ready = Vec::new();
        if data.is_empty() {
            return ready;
        }

        if self.buf.len() + data.len() > self.capacity {
            ready.extend(self.flush());
            if data.len() > self.capacity {
                ready.push(Bytes::copy_from_slice(data));
                return ready;
            }
        }

        self.buf.extend_from_slice(data);
        if self.buf.len() as f64 >= self.capacity as f64 * FLUSH_RATIO {
            ready.extend(self.flush());
        }
        ready
    }

    /// Emit everything buffered so far.
    pub fn flush(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            return None;
        }
        Some(self.buf.split().freeze())
    }
}

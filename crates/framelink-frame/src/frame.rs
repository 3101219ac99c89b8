use std::time::SystemTime;

use bytes::Bytes;

/// One application frame cut out of the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Frame payload with delimiters removed.
    pub data: Bytes,
    /// When the frame was extracted.
    pub timestamp: SystemTime,
    /// Position of the frame in the stream, starting at 1.
    pub sequence: u64,
    /// Checksums are not verified here, so this is always `true` on creation.
    pub checksum_valid: bool,
}

impl RawFrame {
    pub fn new(data: impl Into<Bytes>, sequence: u64) -> Self {
        Self {
            data: data.into(),
            timestamp: SystemTime::now(),
            sequence,
            checksum_valid: true,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

//! Messages exchanged between the pool and its workers.
//!
//! Every request carries a [`RequestId`]; a worker answers each request with
//! exactly one [`WorkerResponse`] carrying the same id.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use framelink_frame::{FrameConfig, RawFrame};

/// Identifies one worker for the lifetime of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Unique request identifier: pool-wide counter plus issue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId {
    pub seq: u64,
    pub issued_at_ms: u64,
}

impl RequestId {
    pub fn new(seq: u64) -> Self {
        let issued_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self { seq, issued_at_ms }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req_{}_{}", self.seq, self.issued_at_ms)
    }
}

#[derive(Debug)]
pub struct WorkerRequest {
    pub id: RequestId,
    pub kind: RequestKind,
}

#[derive(Debug)]
pub enum RequestKind {
    /// Replace the parser configuration.
    Configure(FrameConfig),
    /// Parse a chunk of bytes into frames.
    ProcessData(Bytes),
    /// Drop buffered bytes.
    Reset,
    /// Report buffer statistics.
    GetStats,
}

impl RequestKind {
    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::Configure(_) => "configure",
            RequestKind::ProcessData(_) => "processData",
            RequestKind::Reset => "reset",
            RequestKind::GetStats => "getStats",
        }
    }
}

#[derive(Debug)]
pub struct WorkerResponse {
    pub id: RequestId,
    pub kind: ResponseKind,
}

#[derive(Debug)]
pub enum ResponseKind {
    Configured,
    FrameProcessed(Vec<RawFrame>),
    Reset,
    Stats(BufferStats),
    Error(String),
}

impl ResponseKind {
    pub fn label(&self) -> &'static str {
        match self {
            ResponseKind::Configured => "configured",
            ResponseKind::FrameProcessed(_) => "frameProcessed",
            ResponseKind::Reset => "reset",
            ResponseKind::Stats(_) => "stats",
            ResponseKind::Error(_) => "error",
        }
    }
}

/// Worker-side buffer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Bytes retained in the worker's private buffer.
    pub buffered: usize,
    /// Frames the worker has produced since its last reset.
    pub frames_emitted: u64,
}

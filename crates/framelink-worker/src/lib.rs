//! Supervised pool of parser workers.
//!
//! Each worker is an OS thread that owns a private [`FrameParser`] and talks
//! to the pool only through messages; request buffers move into the worker
//! as [`bytes::Bytes`]. The pool:
//! - picks an idle worker first, then round-robins over healthy ones
//! - correlates every response to its request id, with a timeout
//! - rejects a failed worker's pending requests at once and replaces it
//! - reports aggregate statistics
//!
//! A [`WorkerPool`] must be created inside a tokio runtime; elsewhere
//! construction fails with [`WorkerError::NoRuntime`].

pub mod config;
pub mod error;
pub mod message;
pub mod parser;
pub mod pool;
pub mod stats;
mod worker;

pub use config::{default_worker_count, PoolConfig, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ParseError, Result, WorkerError};
pub use message::{
    BufferStats, RequestId, RequestKind, ResponseKind, WorkerId, WorkerRequest, WorkerResponse,
};
pub use parser::{ExtractorParser, FrameParser, ParserFactory};
pub use pool::{PoolEvent, WorkerPool, WorkerSnapshot, WorkerState};
pub use stats::PoolStats;

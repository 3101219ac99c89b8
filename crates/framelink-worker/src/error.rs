use std::time::Duration;

use crate::message::WorkerId;

/// Errors returned by [`WorkerPool`](crate::WorkerPool) operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    /// The pool has been destroyed. Expected during planned shutdown.
    #[error("worker pool destroyed")]
    PoolDestroyed,

    /// Every worker is in the error state, or the pool is empty.
    #[error("no available workers")]
    NoAvailableWorkers,

    /// No correlated response arrived in time.
    #[error("worker request timeout: {request} after {after:?}")]
    Timeout {
        request: &'static str,
        after: Duration,
    },

    /// The worker crashed while the request was pending.
    #[error("worker {worker} failed: {message}")]
    WorkerFailed { worker: WorkerId, message: String },

    /// The worker answered the request with an error response.
    #[error("worker {worker} processing error: {message}")]
    Processing { worker: WorkerId, message: String },

    /// The worker answered with a response of the wrong type.
    #[error("worker {worker} sent unexpected {response} response")]
    UnexpectedResponse {
        worker: WorkerId,
        response: &'static str,
    },

    /// A broadcast did not succeed on every worker.
    #[error("{request} failed on {} worker(s)", failed.len())]
    BroadcastFailed {
        request: &'static str,
        failed: Vec<WorkerId>,
    },

    /// The worker's request channel is closed.
    #[error("worker {0} is not accepting requests")]
    Disconnected(WorkerId),

    /// The worker is no longer part of the pool.
    #[error("worker {0} not found")]
    WorkerNotFound(WorkerId),

    /// The pool was created outside a tokio runtime.
    #[error("worker pool requires a tokio runtime")]
    NoRuntime,
}

impl WorkerError {
    /// True for the error produced by a destroyed pool.
    pub fn is_pool_destroyed(&self) -> bool {
        matches!(self, WorkerError::PoolDestroyed)
    }

    /// True when the request ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WorkerError::Timeout { .. })
    }
}

/// A parser rejected its input or configuration.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ParseError(pub String);

impl From<framelink_frame::FrameError> for ParseError {
    fn from(err: framelink_frame::FrameError) -> Self {
        Self(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;

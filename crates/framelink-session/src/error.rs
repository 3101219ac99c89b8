use std::time::Duration;

use framelink_frame::FrameError;
use framelink_transport::TransportError;
use framelink_worker::WorkerError;

/// Errors that can occur in supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Invalid configuration; no connection was attempted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Open, write or close failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A worker did not answer in time.
    #[error("worker timed out after {0:?}")]
    WorkerTimeout(Duration),

    /// The worker pool was destroyed. Expected during shutdown.
    #[error("worker pool destroyed")]
    PoolDestroyed,

    /// Any other worker pool failure.
    #[error("worker error: {0}")]
    Worker(WorkerError),

    /// A fatal error tore the session down.
    #[error("fatal error: {0}")]
    Fatal(String),

    /// No active session.
    #[error("no device connected")]
    NotConnected,

    /// The active transport does not accept writes.
    #[error("device is not writable")]
    NotWritable,

    /// Reconnect requested but no previous configuration exists.
    #[error("no connection to re-establish")]
    NothingToReconnect,

    /// The supervisor has been destroyed.
    #[error("supervisor destroyed")]
    Destroyed,
}

impl SessionError {
    /// Whether another reconnect attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Transport(_) | SessionError::Fatal(_))
    }
}

impl From<WorkerError> for SessionError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::PoolDestroyed => SessionError::PoolDestroyed,
            WorkerError::Timeout { after, .. } => SessionError::WorkerTimeout(after),
            other => SessionError::Worker(other),
        }
    }
}

impl From<FrameError> for SessionError {
    fn from(err: FrameError) -> Self {
        SessionError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_errors_map_to_session_kinds() {
        assert!(matches!(
            SessionError::from(WorkerError::PoolDestroyed),
            SessionError::PoolDestroyed
        ));
        let timeout = WorkerError::Timeout {
            request: "processData",
            after: Duration::from_millis(5),
        };
        assert!(matches!(
            SessionError::from(timeout),
            SessionError::WorkerTimeout(d) if d == Duration::from_millis(5)
        ));
        assert!(matches!(
            SessionError::from(WorkerError::NoAvailableWorkers),
            SessionError::Worker(_)
        ));
    }

    #[test]
    fn only_transport_and_fatal_errors_are_retryable() {
        assert!(SessionError::Transport(TransportError::NotOpen).is_retryable());
        assert!(SessionError::Fatal("boom".into()).is_retryable());
        assert!(!SessionError::Configuration("bad".into()).is_retryable());
        assert!(!SessionError::NothingToReconnect.is_retryable());
    }
}

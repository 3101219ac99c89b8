use std::time::Duration;

use framelink_frame::FrameConfig;

/// Default timeout for one worker request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Available parallelism minus one, clamped to `2..=4`.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .saturating_sub(1)
        .clamp(2, 4)
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of workers kept alive.
    pub max_workers: usize,
    /// Timeout applied to every worker request.
    pub request_timeout: Duration,
    /// Whether callers should route extraction through the pool.
    pub threaded_extraction: bool,
    /// Configuration sent to every worker at start.
    pub frame_config: Option<FrameConfig>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: default_worker_count(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            threaded_extraction: true,
            frame_config: None,
        }
    }
}

impl PoolConfig {
    pub fn with_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = Some(config);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_worker_count_is_clamped() {
        let n = default_worker_count();
        assert!((2..=4).contains(&n));
        assert_eq!(PoolConfig::default().request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }
}

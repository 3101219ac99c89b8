use std::time::Duration;

use framelink_frame::FrameConfig;
use framelink_worker::PoolConfig;

/// How long the parallel path may take before falling back.
pub const DEFAULT_PARALLEL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Period of `StatisticsUpdated` events in the supervisor task.
pub const DEFAULT_STATISTICS_INTERVAL: Duration = Duration::from_secs(1);

/// The session is torn down once the error counter exceeds this.
pub const DEFAULT_FATAL_ERROR_THRESHOLD: u64 = 5;

/// Lowercase substrings that make an error message fatal.
pub fn default_fatal_patterns() -> Vec<String> {
    [
        "fatal",
        "enoent",
        "eacces",
        "permission denied",
        "device not found",
        "device disconnected",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Route inbound data through the worker pool.
    pub threaded_extraction: bool,
    /// Pool settings; `None` uses [`PoolConfig::default`].
    pub pool: Option<PoolConfig>,
    /// Initial framing configuration.
    pub frame_config: FrameConfig,
    pub parallel_timeout: Duration,
    pub statistics_interval: Duration,
    pub fatal_error_threshold: u64,
    pub fatal_patterns: Vec<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            threaded_extraction: true,
            pool: None,
            frame_config: FrameConfig::default(),
            parallel_timeout: DEFAULT_PARALLEL_TIMEOUT,
            statistics_interval: DEFAULT_STATISTICS_INTERVAL,
            fatal_error_threshold: DEFAULT_FATAL_ERROR_THRESHOLD,
            fatal_patterns: default_fatal_patterns(),
        }
    }
}

impl SupervisorConfig {
    /// Sequential extraction only; no worker pool is created.
    pub fn sequential() -> Self {
        Self {
            threaded_extraction: false,
            ..Self::default()
        }
    }

    pub fn with_frame_config(mut self, frame_config: FrameConfig) -> Self {
        self.frame_config = frame_config;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_parallel_timeout(mut self, timeout: Duration) -> Self {
        self.parallel_timeout = timeout;
        self
    }

    pub fn with_statistics_interval(mut self, interval: Duration) -> Self {
        self.statistics_interval = interval;
        self
    }

    /// Whether `message` matches one of the fatal patterns.
    pub fn is_fatal_message(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.fatal_patterns
            .iter()
            .any(|pattern| message.contains(pattern.as_str()))
    }
}

/// Exponential backoff for [`ConnectionSupervisor::reconnect_with_policy`](crate::ConnectionSupervisor::reconnect_with_policy).
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        self.initial_delay.mul_f64(factor).min(self.max_delay)
    }
}

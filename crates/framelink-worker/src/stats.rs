use std::time::Duration;

/// Aggregate pool statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    pub total_requests: u64,
    pub completed_requests: u64,
    pub error_requests: u64,
    /// Smoothed processing time in milliseconds.
    pub average_processing_time: f64,
    pub active_workers: usize,
    pub worker_count: usize,
    pub idle_workers: usize,
    pub busy_workers: usize,
    pub error_workers: usize,
    pub pending_requests: usize,
    pub threaded_extraction: bool,
}

/// Running counters kept under the pool lock.
#[derive(Debug, Clone, Default)]
pub(crate) struct Counters {
    pub total_requests: u64,
    pub completed_requests: u64,
    pub error_requests: u64,
    pub average_processing_time: f64,
    pub active_workers: usize,
}

impl Counters {
    /// Folds a sample into the average: `(old + sample) / 2`.
    pub fn record_processing_time(&mut self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.average_processing_time = (self.average_processing_time + sample) / 2.0;
    }
}

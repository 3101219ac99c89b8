//! Communication statistics, export formats and circuit-breaker level.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

/// Cumulative session counters.
///
/// Counters only grow until [`CommunicationStats::reset`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommunicationStats {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    /// Frames delivered to subscribers.
    pub frames_received: u64,
    /// Successful writes.
    pub frames_sent: u64,
    /// Frames produced by the worker pool.
    pub frames_processed: u64,
    pub errors: u64,
    pub reconnections: u64,
    /// Time since the last transition to connected, while connected.
    pub uptime: Duration,
    /// Bytes retained in the sequential accumulator.
    pub memory_usage: u64,
}

impl CommunicationStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Serializes the snapshot as a single record.
    pub fn export(&self, format: StatsFormat) -> String {
        let record = StatsRecord::from(self);
        match format {
            StatsFormat::Json => serde_json::to_string(&record).unwrap_or_else(|_| "{}".to_string()),
            StatsFormat::Csv => {
                let fields = record.fields();
                let header: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
                let values: Vec<String> = fields.iter().map(|(_, v)| v.to_string()).collect();
                format!("{}\n{}\n", header.join(","), values.join(","))
            }
            StatsFormat::Xml => {
                let mut out = String::from("<statistics>");
                for (name, value) in record.fields() {
                    out.push_str(&format!("<{name}>{value}</{name}>"));
                }
                out.push_str("</statistics>");
                out
            }
        }
    }
}

/// Exported shape of [`CommunicationStats`]: every field is a plain
/// counter and uptime is in whole milliseconds.
#[derive(Serialize)]
struct StatsRecord {
    bytes_received: u64,
    bytes_sent: u64,
    frames_received: u64,
    frames_sent: u64,
    frames_processed: u64,
    errors: u64,
    reconnections: u64,
    uptime_ms: u64,
    memory_usage: u64,
}

impl From<&CommunicationStats> for StatsRecord {
    fn from(stats: &CommunicationStats) -> Self {
        Self {
            bytes_received: stats.bytes_received,
            bytes_sent: stats.bytes_sent,
            frames_received: stats.frames_received,
            frames_sent: stats.frames_sent,
            frames_processed: stats.frames_processed,
            errors: stats.errors,
            reconnections: stats.reconnections,
            uptime_ms: u64::try_from(stats.uptime.as_millis()).unwrap_or(u64::MAX),
            memory_usage: stats.memory_usage,
        }
    }
}

impl StatsRecord {
    /// Columns in serialization order, for the flat text formats.
    fn fields(&self) -> [(&'static str, u64); 9] {
        [
            ("bytes_received", self.bytes_received),
            ("bytes_sent", self.bytes_sent),
            ("frames_received", self.frames_received),
            ("frames_sent", self.frames_sent),
            ("frames_processed", self.frames_processed),
            ("errors", self.errors),
            ("reconnections", self.reconnections),
            ("uptime_ms", self.uptime_ms),
            ("memory_usage", self.memory_usage),
        ]
    }
}

/// Export format for [`CommunicationStats::export`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsFormat {
    Json,
    Csv,
    Xml,
}

impl FromStr for StatsFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(StatsFormat::Json),
            "csv" => Ok(StatsFormat::Csv),
            "xml" => Ok(StatsFormat::Xml),
            other => Err(format!("unknown stats format: {other}")),
        }
    }
}

/// Coarse health level derived from the cumulative error counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl CircuitState {
    pub fn from_errors(errors: u64) -> Self {
        match errors {
            0 => CircuitState::Closed,
            1..=4 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::HalfOpen => "HALF_OPEN",
            CircuitState::Open => "OPEN",
        };
        f.write_str(name)
    }
}

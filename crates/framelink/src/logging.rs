use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Prefix shared by every framelink crate's log target.
const FRAMELINK_TARGET: &str = "framelink";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    /// Single-line text without span context.
    Compact,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// framelink crates log at `level`; other crates never above warn.
fn targets(level: LogLevel) -> Targets {
    let level = level.as_filter();
    Targets::new()
        .with_default(level.min(LevelFilter::WARN))
        .with_target(FRAMELINK_TARGET, level)
}

/// Logs go to stderr so stdout carries frames only. Thread names are kept
/// so worker threads show up as `worker-N`.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_thread_names(true);
    let targets = targets(level);

    let _ = match format {
        LogFormat::Text => builder.finish().with(targets).try_init(),
        LogFormat::Compact => builder.compact().finish().with(targets).try_init(),
        LogFormat::Json => builder.json().finish().with(targets).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn framelink_crates_follow_the_requested_level() {
        let filter = targets(LogLevel::Debug);
        assert!(filter.would_enable("framelink_worker::pool", &Level::DEBUG));
        assert!(filter.would_enable("framelink_session::supervisor", &Level::INFO));
        assert!(!filter.would_enable("framelink_worker::pool", &Level::TRACE));
    }

    #[test]
    fn other_crates_are_capped_at_warn() {
        let filter = targets(LogLevel::Trace);
        assert!(filter.would_enable("tokio::runtime", &Level::WARN));
        assert!(!filter.would_enable("tokio::runtime", &Level::INFO));

        let quiet = targets(LogLevel::Error);
        assert!(!quiet.would_enable("tokio::runtime", &Level::WARN));
    }

    #[test]
    fn off_silences_everything() {
        let filter = targets(LogLevel::Off);
        assert!(!filter.would_enable("framelink", &Level::ERROR));
        assert!(!filter.would_enable("tokio", &Level::ERROR));
    }
}

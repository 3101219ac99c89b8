use std::io::Read;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use clap::{Args, Subcommand, ValueEnum};
use framelink_frame::{FrameConfig, FrameDetection};
use framelink_session::StatsFormat;

use crate::exit::{frame_error, io_error, json_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod extract;
pub mod replay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split a byte stream into frames and print them.
    Extract(ExtractArgs),
    /// Feed a byte stream through a connection supervisor and print frames and statistics.
    Replay(ReplayArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Extract(args) => extract::run(args, format),
        Command::Replay(args) => replay::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Detection {
    End,
    StartEnd,
    Start,
    None,
}

impl From<Detection> for FrameDetection {
    fn from(detection: Detection) -> Self {
        match detection {
            Detection::End => FrameDetection::EndDelimiterOnly,
            Detection::StartEnd => FrameDetection::StartAndEndDelimiter,
            Detection::Start => FrameDetection::StartDelimiterOnly,
            Detection::None => FrameDetection::NoDelimiters,
        }
    }
}

/// Framing options shared by `extract` and `replay`.
#[derive(Args, Debug, Default)]
pub struct FramingArgs {
    /// Frame configuration file (JSON). Flags below override its fields.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Boundary detection policy.
    #[arg(long, value_enum)]
    pub detection: Option<Detection>,
    /// Start delimiter. Accepts \n, \r, \t, \\ and \xHH escapes.
    #[arg(long, value_parser = parse_delimiter)]
    pub start: Option<Bytes>,
    /// Finish delimiter. Accepts \n, \r, \t, \\ and \xHH escapes.
    #[arg(long, value_parser = parse_delimiter)]
    pub finish: Option<Bytes>,
}

impl FramingArgs {
    pub fn frame_config(&self) -> CliResult<FrameConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|err| io_error(&format!("read {}", path.display()), err))?;
                serde_json::from_str(&text)
                    .map_err(|err| json_error(&format!("parse {}", path.display()), err))?
            }
            None => FrameConfig::default(),
        };
        if let Some(detection) = self.detection {
            config.frame_detection = detection.into();
        }
        if let Some(start) = &self.start {
            config.start_sequence = start.clone();
        }
        if let Some(finish) = &self.finish {
            config.finish_sequence = finish.clone();
        }
        config
            .validate()
            .map_err(|err| frame_error("invalid frame configuration", err))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Input file, or `-` for stdin.
    pub input: PathBuf,
    #[command(flatten)]
    pub framing: FramingArgs,
    /// Bytes fed to the extractor per step.
    #[arg(long, default_value = "4096", value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_size: u64,
    /// Also emit the trailing unterminated frame at end of input.
    #[arg(long)]
    pub flush: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum StatsFormatArg {
    Json,
    Csv,
    Xml,
}

impl From<StatsFormatArg> for StatsFormat {
    fn from(format: StatsFormatArg) -> Self {
        match format {
            StatsFormatArg::Json => StatsFormat::Json,
            StatsFormatArg::Csv => StatsFormat::Csv,
            StatsFormatArg::Xml => StatsFormat::Xml,
        }
    }
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Input file, or `-` for stdin.
    pub input: PathBuf,
    #[command(flatten)]
    pub framing: FramingArgs,
    /// Bytes delivered by the transport per read.
    #[arg(long, default_value = "4096", value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_size: u64,
    /// Extract frames on the worker pool.
    #[arg(long)]
    pub threaded: bool,
    /// Worker threads (with --threaded). Default: CPUs - 1, clamped to 2..=4.
    #[arg(long)]
    pub workers: Option<usize>,
    /// Parallel extraction timeout in milliseconds before falling back.
    #[arg(long, value_name = "MS")]
    pub parallel_timeout: Option<u64>,
    /// Statistics export format.
    #[arg(long, value_enum, default_value = "json")]
    pub stats_format: StatsFormatArg,
    /// Print worker pool statistics.
    #[arg(long)]
    pub worker_stats: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Reads the whole input; `-` means stdin.
pub fn read_input(path: &Path) -> CliResult<Vec<u8>> {
    if path == Path::new("-") {
        let mut data = Vec::new();
        std::io::stdin()
            .read_to_end(&mut data)
            .map_err(|err| io_error("read stdin", err))?;
        return Ok(data);
    }
    std::fs::read(path).map_err(|err| io_error(&format!("read {}", path.display()), err))
}

/// Parses a delimiter argument with C-style escapes.
pub fn parse_delimiter(raw: &str) -> Result<Bytes, String> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.bytes();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b't') => out.push(b'\t'),
            Some(b'0') => out.push(0),
            Some(b'\\') => out.push(b'\\'),
            Some(b'x') => {
                let hex: Vec<u8> = bytes.by_ref().take(2).collect();
                let value = std::str::from_utf8(&hex)
                    .ok()
                    .filter(|h| h.len() == 2)
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| format!("invalid \\x escape in {raw:?}"))?;
                out.push(value);
            }
            Some(other) => return Err(format!("unknown escape \\{} in {raw:?}", other as char)),
            None => return Err(format!("dangling backslash in {raw:?}")),
        }
    }
    if out.is_empty() {
        return Err("delimiter must not be empty".to_string());
    }
    Ok(Bytes::from(out))
}

pub fn usage_error(message: impl Into<String>) -> CliError {
    CliError::new(USAGE, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_escapes() {
        assert_eq!(parse_delimiter("\\r\\n").unwrap().as_ref(), b"\r\n");
        assert_eq!(parse_delimiter("\\x02").unwrap().as_ref(), &[0x02]);
        assert_eq!(parse_delimiter("$$").unwrap().as_ref(), b"$$");
        assert_eq!(parse_delimiter("a\\\\b").unwrap().as_ref(), b"a\\b");
    }

    #[test]
    fn delimiter_rejects_bad_input() {
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("\\x2").is_err());
        assert!(parse_delimiter("\\q").is_err());
        assert!(parse_delimiter("end\\").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let args = FramingArgs {
            detection: Some(Detection::StartEnd),
            start: Some(Bytes::from_static(b"<")),
            finish: Some(Bytes::from_static(b">")),
            ..FramingArgs::default()
        };
        let config = args.frame_config().unwrap();
        assert_eq!(config.frame_detection, FrameDetection::StartAndEndDelimiter);
        assert_eq!(config.start_sequence.as_ref(), b"<");
    }

    #[test]
    fn missing_delimiter_is_a_usage_error() {
        let args = FramingArgs {
            detection: Some(Detection::Start),
            ..FramingArgs::default()
        };
        assert_eq!(args.frame_config().unwrap_err().code, USAGE);
    }
}

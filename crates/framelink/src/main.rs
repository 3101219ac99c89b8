mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "framelink", version, about = "Byte-stream framing CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level for framelink crates (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "warn",
        env = "FRAMELINK_LOG",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extract_subcommand() {
        let cli = Cli::try_parse_from([
            "framelink",
            "extract",
            "capture.bin",
            "--detection",
            "start-end",
            "--start",
            "\\x02",
            "--finish",
            "\\x03",
        ])
        .expect("extract args should parse");

        match cli.command {
            Command::Extract(args) => {
                assert_eq!(args.chunk_size, 4096);
                assert_eq!(args.framing.start.as_deref(), Some(&[0x02][..]));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let err = Cli::try_parse_from(["framelink", "extract", "-", "--chunk-size", "0"])
            .expect_err("zero chunk size should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_replay_subcommand() {
        let cli = Cli::try_parse_from([
            "framelink",
            "replay",
            "-",
            "--threaded",
            "--workers",
            "2",
            "--stats-format",
            "csv",
        ])
        .expect("replay args should parse");
        assert!(matches!(cli.command, Command::Replay(_)));
    }

    #[test]
    fn parses_compact_log_format() {
        let cli = Cli::try_parse_from([
            "framelink",
            "--log-format",
            "compact",
            "--log-level",
            "off",
            "version",
        ])
        .expect("log flags should parse");
        assert!(matches!(cli.log_format, LogFormat::Compact));
        assert!(matches!(cli.log_level, LogLevel::Off));
    }
}

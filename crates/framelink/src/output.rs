use std::io::{IsTerminal, Write};
use std::time::UNIX_EPOCH;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framelink_frame::RawFrame;
use framelink_worker::PoolStats;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput {
    sequence: u64,
    size: usize,
    payload: String,
    checksum_valid: bool,
    timestamp_ms: u128,
}

impl From<&RawFrame> for FrameOutput {
    fn from(frame: &RawFrame) -> Self {
        Self {
            sequence: frame.sequence,
            size: frame.len(),
            payload: payload_preview(frame.data.as_ref()),
            checksum_valid: frame.checksum_valid,
            timestamp_ms: frame
                .timestamp
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0),
        }
    }
}

/// Prints frames. JSON is one object per line; table collects all rows.
pub fn print_frames(frames: &[RawFrame], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for frame in frames {
                println!(
                    "{}",
                    serde_json::to_string(&FrameOutput::from(frame))
                        .unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            if frames.is_empty() {
                return;
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "SIZE", "PAYLOAD"]);
            for frame in frames {
                table.add_row(vec![
                    frame.sequence.to_string(),
                    frame.len().to_string(),
                    payload_preview(frame.data.as_ref()),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for frame in frames {
                println!(
                    "seq={} size={} payload={}",
                    frame.sequence,
                    frame.len(),
                    payload_preview(frame.data.as_ref())
                );
            }
        }
        OutputFormat::Raw => {
            for frame in frames {
                print_raw(frame.data.as_ref());
            }
        }
    }
}

pub fn print_worker_stats(stats: &PoolStats, format: OutputFormat) {
    let rows = [
        ("threaded_extraction", stats.threaded_extraction.to_string()),
        ("worker_count", stats.worker_count.to_string()),
        ("idle_workers", stats.idle_workers.to_string()),
        ("busy_workers", stats.busy_workers.to_string()),
        ("error_workers", stats.error_workers.to_string()),
        ("total_requests", stats.total_requests.to_string()),
        ("completed_requests", stats.completed_requests.to_string()),
        ("error_requests", stats.error_requests.to_string()),
        ("pending_requests", stats.pending_requests.to_string()),
        (
            "average_processing_time_ms",
            format!("{:.3}", stats.average_processing_time),
        ),
    ];

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["WORKERS", "VALUE"]);
            for (name, value) in rows {
                table.add_row(vec![name.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Json => {
            let out = serde_json::json!({
                "threaded_extraction": stats.threaded_extraction,
                "worker_count": stats.worker_count,
                "idle_workers": stats.idle_workers,
                "busy_workers": stats.busy_workers,
                "error_workers": stats.error_workers,
                "total_requests": stats.total_requests,
                "completed_requests": stats.completed_requests,
                "error_requests": stats.error_requests,
                "pending_requests": stats.pending_requests,
                "average_processing_time_ms": stats.average_processing_time,
            });
            println!("{out}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            let line: Vec<String> = rows
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("{}", line.join(" "));
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output formatting for the subpiper CLI.

use serde::Serialize;
use subpiper::{RunSummary, StreamKind};

/// How lines and the final summary are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `out: <line>` / `err: <line>`.
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Serialize)]
struct LineRecord<'a> {
    stream: StreamKind,
    line: &'a str,
}

/// Final JSON record of a run.
#[derive(Debug, Serialize)]
pub struct SummaryRecord {
    /// Exit code of the child.
    pub exit_code: i32,
    /// Lines delivered from stdout.
    pub stdout_lines: u64,
    /// Lines delivered from stderr.
    pub stderr_lines: u64,
    /// Lines that were not valid UTF-8.
    pub decode_warnings: u64,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

impl From<&RunSummary> for SummaryRecord {
    fn from(summary: &RunSummary) -> Self {
        Self {
            exit_code: summary.exit_code,
            stdout_lines: summary.stdout.lines,
            stderr_lines: summary.stderr.lines,
            decode_warnings: summary.stdout.decode_warnings + summary.stderr.decode_warnings,
            duration_ms: summary.duration.as_millis() as u64,
        }
    }
}

fn prefix(stream: StreamKind) -> &'static str {
    match stream {
        StreamKind::Stdout => "out",
        StreamKind::Stderr => "err",
    }
}

/// Render one child line.
pub fn format_line(format: OutputFormat, stream: StreamKind, line: &str) -> String {
    match format {
        OutputFormat::Text => format!("{}: {line}", prefix(stream)),
        OutputFormat::Json => serde_json::to_string(&LineRecord { stream, line })
            .unwrap_or_else(|_| format!("{{\"stream\":\"{stream}\",\"line\":null}}")),
    }
}

/// Render the summary record (JSON output only).
pub fn format_summary(summary: &RunSummary) -> String {
    serde_json::to_string(&SummaryRecord::from(summary))
        .unwrap_or_else(|_| format!("{{\"exit_code\":{}}}", summary.exit_code))
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-stream read loop.
//!
//! Reading is async; the caller's callback runs on a thread from Tokio's
//! blocking pool, one per pump, fed through a bounded queue. A slow callback
//! therefore only stalls its own stream.

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tracing::{debug, warn};

use crate::callback::{CallbackFailure, LineCallback};
use crate::decode::{DecodePolicy, DecodedLine, decode_line, strip_terminator};
use crate::StreamKind;

/// Decoded lines waiting for the callback thread.
const LINE_QUEUE_DEPTH: usize = 64;

/// Whether a pump is still draining its pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpState {
    /// Reading; end-of-stream not yet seen.
    Running,
    /// End-of-stream reached (or the read failed). Terminal.
    Completed,
}

/// Tunables shared by both pumps of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpOptions {
    /// How malformed UTF-8 is handled.
    pub decode: DecodePolicy,
    /// Keep a copy of every delivered line in the [`PumpReport`].
    pub capture: bool,
    /// Longest line, in bytes, held in memory. A longer line is delivered in
    /// pieces of at most this size. `None` buffers lines of any length.
    pub max_line_bytes: Option<usize>,
}

/// What a pump saw by the time it completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpReport {
    /// Stream this report covers.
    pub stream: StreamKind,
    /// Lines handed to the callback.
    pub lines: u64,
    /// Raw bytes read from the pipe, including anything drained after a
    /// callback failure.
    pub bytes: u64,
    /// Lines that were not valid UTF-8 (repaired or skipped).
    pub decode_warnings: u64,
    /// Lines dropped under [`DecodePolicy::Skip`].
    pub skipped_lines: u64,
    /// Lines cut at [`PumpOptions::max_line_bytes`].
    pub split_lines: u64,
    /// Delivered lines, when capture was requested.
    pub captured: Option<Vec<String>>,
    /// Set when the callback failed; no lines were delivered after it.
    pub failure: Option<CallbackFailure>,
}

impl PumpReport {
    fn new(stream: StreamKind) -> Self {
        Self {
            stream,
            lines: 0,
            bytes: 0,
            decode_warnings: 0,
            skipped_lines: 0,
            split_lines: 0,
            captured: None,
            failure: None,
        }
    }

    /// `true` when the callback never failed.
    pub fn is_clean(&self) -> bool {
        self.failure.is_none()
    }
}

/// Errors that end a pump before end-of-stream.
#[derive(Debug, thiserror::Error)]
pub enum PumpError {
    /// Reading the pipe failed.
    #[error("failed to read child {stream}: {source}")]
    Read {
        /// Stream being read.
        stream: StreamKind,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The callback thread was cancelled before it finished.
    #[error("{stream} callback thread did not finish: {source}")]
    Delivery {
        /// Stream being delivered.
        stream: StreamKind,
        /// Join failure from the blocking pool.
        #[source]
        source: JoinError,
    },
}

/// Drains one pipe end, delivering each line to a [`LineCallback`].
///
/// ```no_run
/// # async fn demo() {
/// use subpiper_pump::{LineCallback, PumpOptions, StreamKind, StreamPump};
///
/// let input: &[u8] = b"one\ntwo\n";
/// let pump = StreamPump::new(
///     StreamKind::Stdout,
///     input,
///     LineCallback::new(|line| println!("got {line}")),
///     PumpOptions::default(),
/// );
/// let report = pump.run().await.unwrap();
/// assert_eq!(report.lines, 2);
/// # }
/// ```
pub struct StreamPump<R> {
    stream: StreamKind,
    reader: BufReader<R>,
    callback: LineCallback,
    options: PumpOptions,
    state: watch::Sender<PumpState>,
}

/// Outcome of the callback thread.
struct Delivery {
    lines: u64,
    captured: Option<Vec<String>>,
    failure: Option<CallbackFailure>,
}

impl<R: AsyncRead + Unpin> StreamPump<R> {
    /// Create a pump in the [`PumpState::Running`] state.
    pub fn new(stream: StreamKind, reader: R, callback: LineCallback, options: PumpOptions) -> Self {
        let (state, _) = watch::channel(PumpState::Running);
        Self {
            stream,
            reader: BufReader::new(reader),
            callback,
            options,
            state,
        }
    }

    /// Stream this pump drains.
    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    /// Current state.
    pub fn state(&self) -> PumpState {
        *self.state.borrow()
    }

    /// Watch the pump's state from another task.
    pub fn subscribe(&self) -> watch::Receiver<PumpState> {
        self.state.subscribe()
    }

    /// Read until end-of-stream, delivering each line as soon as its
    /// terminator arrives.
    ///
    /// Unterminated trailing bytes are delivered as a final line. Once the
    /// callback fails, remaining input is read and discarded so the writer
    /// never blocks on a full pipe. Resolves only after the last callback
    /// has returned.
    ///
    /// Must be polled inside a Tokio runtime: the callback runs on its
    /// blocking pool.
    pub async fn run(self) -> Result<PumpReport, PumpError> {
        let Self {
            stream,
            mut reader,
            callback,
            options,
            state,
        } = self;

        let (tx, rx) = mpsc::channel(LINE_QUEUE_DEPTH);
        let delivery =
            tokio::task::spawn_blocking(move || deliver(stream, callback, rx, options.capture));

        let mut report = PumpReport::new(stream);
        let read = read_lines(&mut reader, tx, options, &mut report).await;
        let delivery = delivery.await;
        state.send_replace(PumpState::Completed);

        if let Err(source) = read {
            warn!(target: "subpiper.pump", %stream, error = %source, "pipe read failed");
            return Err(PumpError::Read { stream, source });
        }
        let delivery = delivery.map_err(|source| PumpError::Delivery { stream, source })?;
        report.lines = delivery.lines;
        report.captured = delivery.captured;
        report.failure = delivery.failure;

        debug!(
            target: "subpiper.pump",
            %stream,
            lines = report.lines,
            bytes = report.bytes,
            "end of stream"
        );
        Ok(report)
    }
}

/// Read and decode lines, queueing them for the callback thread. Keeps
/// reading after the queue closes. Dropping `tx` on return ends delivery.
async fn read_lines<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    tx: mpsc::Sender<String>,
    options: PumpOptions,
    report: &mut PumpReport,
) -> io::Result<()> {
    let stream = report.stream;
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        let n = read_line(reader, &mut buf, options.max_line_bytes).await?;
        if n == 0 {
            return Ok(());
        }
        report.bytes += n as u64;
        if tx.is_closed() {
            continue;
        }
        if !buf.ends_with(b"\n") && options.max_line_bytes.is_some_and(|max| buf.len() >= max) {
            report.split_lines += 1;
            debug!(target: "subpiper.pump", %stream, len = buf.len(), "line split at size cap");
        }

        let line = match decode_line(strip_terminator(&buf), options.decode) {
            DecodedLine::Clean(s) => s.to_owned(),
            DecodedLine::Repaired(s) => {
                report.decode_warnings += 1;
                warn!(target: "subpiper.pump", %stream, "replaced malformed UTF-8 in line");
                s
            }
            DecodedLine::Dropped => {
                report.decode_warnings += 1;
                report.skipped_lines += 1;
                warn!(target: "subpiper.pump", %stream, "skipped line with malformed UTF-8");
                continue;
            }
        };

        // A send error means the callback failed; keep draining.
        let _ = tx.send(line).await;
    }
}

/// Read one line into `buf`, terminator included. With a cap, stop after
/// `max` bytes even without a terminator. Returns the bytes consumed.
async fn read_line<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
    max: Option<usize>,
) -> io::Result<usize> {
    let Some(max) = max else {
        return reader.read_until(b'\n', buf).await;
    };
    let max = max.max(1);
    let mut total = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(total);
        }
        let window = &available[..available.len().min(max - buf.len())];
        let (used, done) = match window.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (window.len(), buf.len() + window.len() >= max),
        };
        buf.extend_from_slice(&window[..used]);
        reader.consume(used);
        total += used;
        if done {
            return Ok(total);
        }
    }
}

/// Callback thread: invoke the callback per queued line until the queue
/// ends or the callback fails.
fn deliver(
    stream: StreamKind,
    mut callback: LineCallback,
    mut rx: mpsc::Receiver<String>,
    capture: bool,
) -> Delivery {
    let mut delivery = Delivery {
        lines: 0,
        captured: capture.then(Vec::new),
        failure: None,
    };
    while let Some(line) = rx.blocking_recv() {
        delivery.lines += 1;
        let result = callback.invoke(&line);
        if let Some(captured) = delivery.captured.as_mut() {
            captured.push(line);
        }
        if let Err(failure) = result {
            warn!(
                target: "subpiper.pump",
                %stream,
                error = %failure,
                "line callback failed; draining remaining output"
            );
            delivery.failure = Some(failure);
            break;
        }
    }
    delivery
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collecting() -> (LineCallback, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb = LineCallback::new(move |line| sink.lock().unwrap().push(line.to_string()));
        (cb, seen)
    }

    async fn pump_bytes(input: &'static [u8], options: PumpOptions) -> (PumpReport, Vec<String>) {
        let (cb, seen) = collecting();
        let report = StreamPump::new(StreamKind::Stdout, input, cb, options)
            .run()
            .await
            .unwrap();
        let lines = seen.lock().unwrap().clone();
        (report, lines)
    }

    #[tokio::test]
    async fn delivers_each_line_without_terminator() {
        let (report, lines) = pump_bytes(b"one\ntwo\r\nthree\n", PumpOptions::default()).await;
        assert_eq!(lines, ["one", "two", "three"]);
        assert_eq!(report.lines, 3);
        assert_eq!(report.bytes, 15);
    }

    #[tokio::test]
    async fn trailing_bytes_become_a_final_line() {
        let (_, lines) = pump_bytes(b"a\nno newline", PumpOptions::default()).await;
        assert_eq!(lines, ["a", "no newline"]);
    }

    #[tokio::test]
    async fn empty_input_delivers_nothing() {
        let (report, lines) = pump_bytes(b"", PumpOptions::default()).await;
        assert!(lines.is_empty());
        assert_eq!(report.lines, 0);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn blank_lines_are_delivered() {
        let (_, lines) = pump_bytes(b"\n\nx\n", PumpOptions::default()).await;
        assert_eq!(lines, ["", "", "x"]);
    }

    #[tokio::test]
    async fn capture_keeps_a_copy() {
        let options = PumpOptions {
            capture: true,
            ..Default::default()
        };
        let (report, _) = pump_bytes(b"x\ny\n", options).await;
        assert_eq!(report.captured.unwrap(), ["x", "y"]);
    }

    #[tokio::test]
    async fn state_moves_to_completed() {
        let (cb, _) = collecting();
        let pump = StreamPump::new(StreamKind::Stderr, &b"x\n"[..], cb, PumpOptions::default());
        let mut rx = pump.subscribe();
        assert_eq!(pump.state(), PumpState::Running);
        pump.run().await.unwrap();
        assert_eq!(*rx.borrow(), PumpState::Completed);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! A busy callback on one stream must not hold back the other stream, in
//! every run mode and on every runtime flavor.
#![cfg(unix)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use subpiper::{Command, Subpiper};

/// Set by the stdout callback: `Some(true)` if a stderr line arrived while
/// it was blocked.
type Verdict = Arc<Mutex<Option<bool>>>;

/// A run whose stdout callback blocks until the stderr callback has fired.
fn cross_waiting_run() -> (Subpiper, Verdict) {
    let verdict: Verdict = Arc::default();
    let record = Arc::clone(&verdict);
    let (tx, rx) = mpsc::channel::<()>();

    let run = Subpiper::new(
        Command::new("sh")
            .arg("-c")
            .arg("echo out; sleep 0.1; echo err >&2"),
    )
    .on_stdout(move |_| {
        let got = rx.recv_timeout(Duration::from_secs(5)).is_ok();
        *record.lock().unwrap() = Some(got);
    })
    .on_stderr(move |_| {
        let _ = tx.send(());
    });
    (run, verdict)
}

// ---------------------------------------------------------------------------
// Async mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn async_run_on_current_thread_runtime() {
    let (run, verdict) = cross_waiting_run();
    assert_eq!(run.run().await.unwrap(), 0);
    assert_eq!(*verdict.lock().unwrap(), Some(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn async_run_on_single_worker_runtime() {
    let (run, verdict) = cross_waiting_run();
    assert_eq!(run.run().await.unwrap(), 0);
    assert_eq!(*verdict.lock().unwrap(), Some(true));
}

// ---------------------------------------------------------------------------
// Blocking and background modes
// ---------------------------------------------------------------------------

#[test]
fn blocking_run_repeatedly() {
    for attempt in 0..10 {
        let (run, verdict) = cross_waiting_run();
        assert_eq!(run.run_blocking().unwrap(), 0);
        assert_eq!(*verdict.lock().unwrap(), Some(true), "attempt {attempt}");
    }
}

#[test]
fn background_run() {
    let (run, verdict) = cross_waiting_run();
    let (tx, rx) = mpsc::channel();
    let handle = run.spawn(move |code| tx.send(code).unwrap()).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), 0);
    handle.join().unwrap();
    assert_eq!(*verdict.lock().unwrap(), Some(true));
}

// ---------------------------------------------------------------------------
// Line size cap through a real pipe
// ---------------------------------------------------------------------------

#[test]
fn capped_run_splits_long_lines() {
    let output = Subpiper::new(Command::new("sh").arg("-c").arg("printf 'abcdefgh\\nok\\n'"))
        .silent(true)
        .max_line_bytes(3)
        .output_blocking()
        .unwrap();
    assert_eq!(output.stdout, ["abc", "def", "gh", "ok"]);
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blocking, async and background runs through `Subpiper`.
#![cfg(unix)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use subpiper::{
    Command, DecodePolicy, FAILED_RUN_EXIT_CODE, RunOutput, StreamKind, Subpiper, SubpiperError,
};

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::default()
}

fn push(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn sh(script: &str) -> Subpiper {
    Subpiper::new(Command::new("sh").arg("-c").arg(script))
}

// ---------------------------------------------------------------------------
// Blocking mode
// ---------------------------------------------------------------------------

#[test]
fn blocking_echo_magic() {
    let out = new_log();
    let err = new_log();
    let (o, e) = (Arc::clone(&out), Arc::clone(&err));
    let code = Subpiper::parse("echo magic")
        .unwrap()
        .on_stdout(move |line| push(&o, line))
        .on_stderr(move |line| push(&e, line))
        .run_blocking()
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(*out.lock().unwrap(), ["magic"]);
    assert!(err.lock().unwrap().is_empty());
}

#[test]
fn blocking_reports_nonzero_exit() {
    let err = new_log();
    let e = Arc::clone(&err);
    let code = sh("echo oops >&2; exit 2")
        .silent(true)
        .on_stderr(move |line| push(&e, line))
        .run_blocking()
        .unwrap();
    assert_eq!(code, 2);
    assert_eq!(*err.lock().unwrap(), ["oops"]);
}

#[test]
fn blocking_returns_after_every_line() {
    let log = new_log();
    let (o, e) = (Arc::clone(&log), Arc::clone(&log));
    let code = sh("for i in 1 2 3; do echo o$i; echo e$i >&2; done")
        .on_stdout(move |line| push(&o, line))
        .on_stderr(move |line| push(&e, line))
        .run_blocking()
        .unwrap();
    push(&log, "finished");

    let log = log.lock().unwrap();
    assert_eq!(code, 0);
    assert_eq!(log.len(), 7);
    assert_eq!(log.last().map(String::as_str), Some("finished"));
}

#[test]
fn blocking_launch_error_is_raised() {
    let err = Subpiper::new(Command::new("subpiper-missing-binary-abc"))
        .silent(true)
        .run_blocking()
        .unwrap_err();
    assert!(err.is_launch());
}

#[test]
fn parse_errors_surface_before_launch() {
    let err = Subpiper::parse("echo 'unterminated").unwrap_err();
    assert!(matches!(err, SubpiperError::Command(_)));
}

#[test]
fn output_blocking_captures_both_streams() {
    let output = sh("echo a; echo b; echo c >&2; exit 3")
        .silent(true)
        .output_blocking()
        .unwrap();
    assert_eq!(
        output,
        RunOutput {
            exit_code: 3,
            stdout: vec!["a".into(), "b".into()],
            stderr: vec!["c".into()],
        }
    );
}

#[test]
fn output_still_invokes_callbacks() {
    let out = new_log();
    let o = Arc::clone(&out);
    let output = Subpiper::parse("echo hi")
        .unwrap()
        .on_stdout(move |line| push(&o, line))
        .output_blocking()
        .unwrap();
    assert_eq!(output.stdout, ["hi"]);
    assert_eq!(*out.lock().unwrap(), ["hi"]);
}

#[test]
fn skip_policy_drops_malformed_lines() {
    let output = sh("printf 'good\\n\\377\\376\\nalso good\\n'")
        .silent(true)
        .decode_policy(DecodePolicy::Skip)
        .output_blocking()
        .unwrap();
    assert_eq!(output.stdout, ["good", "also good"]);
}

#[test]
fn current_dir_is_used() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "here\n").unwrap();
    let output = Subpiper::parse("cat marker.txt")
        .unwrap()
        .current_dir(dir.path())
        .silent(true)
        .output_blocking()
        .unwrap();
    assert_eq!(output.stdout, ["here"]);
}

#[test]
fn repeated_runs_are_independent() {
    let first = Subpiper::parse("echo magic").unwrap().silent(true).output_blocking().unwrap();
    let second = Subpiper::parse("echo magic").unwrap().silent(true).output_blocking().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.stdout, ["magic"]);
}

#[test]
fn fallible_callback_error_carries_exit_code() {
    let err = sh("echo one; echo two; exit 5")
        .try_on_stdout(|line: &str| if line == "two" { Err("no twos") } else { Ok(()) })
        .silent(true)
        .run_blocking()
        .unwrap_err();
    match err {
        SubpiperError::Callback {
            stream, exit_code, ..
        } => {
            assert_eq!(stream, StreamKind::Stdout);
            assert_eq!(exit_code, 5);
        }
        other => panic!("expected callback error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Async mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn async_run_summary_has_counts() {
    let summary = sh("echo x; echo y >&2; echo z")
        .silent(true)
        .run_summary()
        .await
        .unwrap();
    assert_eq!(summary.exit_code, 0);
    assert_eq!(summary.stdout.lines, 2);
    assert_eq!(summary.stderr.lines, 1);
    assert_eq!(summary.transitions.len(), 4);
}

#[tokio::test]
async fn blocking_call_inside_runtime_is_refused() {
    let err = Subpiper::parse("true").unwrap().run_blocking().unwrap_err();
    assert!(matches!(err, SubpiperError::NestedRuntime));
}

// ---------------------------------------------------------------------------
// Background mode
// ---------------------------------------------------------------------------

#[test]
fn background_echo_magic() {
    let out = new_log();
    let o = Arc::clone(&out);
    let (tx, rx) = mpsc::channel();
    let handle = Subpiper::parse("echo magic")
        .unwrap()
        .on_stdout(move |line| push(&o, line))
        .on_stderr(|line| panic!("unexpected stderr: {line}"))
        .spawn(move |code| tx.send(code).unwrap())
        .unwrap();

    let code = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(code, 0);
    assert_eq!(*out.lock().unwrap(), ["magic"]);
    assert_eq!(handle.join().unwrap().exit_code, 0);
}

#[test]
fn background_completion_fires_after_all_lines() {
    let log = new_log();
    let (o, e, f) = (Arc::clone(&log), Arc::clone(&log), Arc::clone(&log));
    let handle = sh("i=0; while [ $i -lt 200 ]; do echo o$i; echo e$i >&2; i=$((i+1)); done")
        .on_stdout(move |line| push(&o, line))
        .on_stderr(move |line| push(&e, line))
        .spawn(move |code| push(&f, format!("finished {code}")))
        .unwrap();
    handle.join().unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 401);
    assert_eq!(log.last().map(String::as_str), Some("finished 0"));
}

#[test]
fn background_completion_fires_exactly_once() {
    let calls = Arc::new(Mutex::new(0));
    let c = Arc::clone(&calls);
    let handle = Subpiper::parse("true")
        .unwrap()
        .spawn(move |_| *c.lock().unwrap() += 1)
        .unwrap();
    handle.join().unwrap();
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn background_launch_failure_gets_sentinel() {
    let (tx, rx) = mpsc::channel();
    let handle = Subpiper::new(Command::new("subpiper-missing-binary-def"))
        .spawn(move |code| tx.send(code).unwrap())
        .unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), FAILED_RUN_EXIT_CODE);
    assert!(handle.join().unwrap_err().is_launch());
}

#[test]
fn background_callback_failure_gets_sentinel() {
    let (tx, rx) = mpsc::channel();
    let handle = sh("echo a; echo b; exit 1")
        .on_stdout(|_| panic!("handler bug"))
        .silent(true)
        .spawn(move |code| tx.send(code).unwrap())
        .unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), FAILED_RUN_EXIT_CODE);
    assert_eq!(handle.join().unwrap_err().exit_code(), Some(1));
}

#[test]
fn panicking_completion_callback_is_reported() {
    let handle = Subpiper::parse("true")
        .unwrap()
        .spawn(|_| panic!("completion bug"))
        .unwrap();
    match handle.join().unwrap_err() {
        SubpiperError::CompletionCallback(failure) => {
            assert!(failure.panicked());
            assert!(failure.message().contains("completion bug"));
        }
        other => panic!("expected completion callback error, got {other:?}"),
    }
}

#[test]
fn spawn_returns_before_the_child_finishes() {
    let (tx, rx) = mpsc::channel();
    let handle = Subpiper::parse("sleep 1")
        .unwrap()
        .spawn(move |code| tx.send(code).unwrap())
        .unwrap();
    assert!(!handle.is_finished());
    assert!(rx.try_recv().is_err());
    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), 0);
    handle.join().unwrap();
}

#[tokio::test]
async fn spawn_works_from_async_code() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let _handle = Subpiper::parse("echo hi")
        .unwrap()
        .silent(true)
        .spawn(move |code| {
            let _ = tx.send(code);
        })
        .unwrap();
    let code = tokio::time::timeout(Duration::from_secs(10), rx).await.unwrap().unwrap();
    assert_eq!(code, 0);
}

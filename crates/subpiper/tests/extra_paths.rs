// SPDX-License-Identifier: MIT OR Apache-2.0
//! Executable resolution through extra search-path entries.
//!
//! Kept as a single test in its own binary: writing a script and executing it
//! while sibling test threads fork can fail with `ETXTBSY`.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use subpiper::{Command, Subpiper};

const TOOL: &str = "subpiper-marker-tool";

fn install_tool(dir: &Path, output: &str) {
    let path = dir.join(TOOL);
    std::fs::write(&path, format!("#!/bin/sh\necho {output}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn extra_paths_resolve_tools_in_both_modes() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    install_tool(first.path(), "from-first");
    install_tool(second.path(), "from-second");

    // Not on the inherited search path.
    let err = Subpiper::new(Command::new(TOOL))
        .silent(true)
        .run_blocking()
        .unwrap_err();
    assert!(err.is_launch(), "unexpected error: {err}");

    // Blocking mode, single entry.
    let out = Subpiper::new(Command::new(TOOL))
        .extra_path(first.path())
        .silent(true)
        .output_blocking()
        .unwrap();
    assert_eq!(out.exit_code, 0);
    assert_eq!(out.stdout, ["from-first"]);

    // Earlier entries win.
    let out = Subpiper::new(Command::new(TOOL))
        .extra_paths([second.path(), first.path()])
        .silent(true)
        .output_blocking()
        .unwrap();
    assert_eq!(out.stdout, ["from-second"]);

    // Non-blocking mode.
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let (tx, rx) = mpsc::channel();
    let handle = Subpiper::new(Command::new(TOOL))
        .extra_path(first.path())
        .on_stdout(move |line| sink.lock().unwrap().push(line.to_string()))
        .spawn(move |code| tx.send(code).unwrap())
        .unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), 0);
    handle.join().unwrap();
    assert_eq!(*lines.lock().unwrap(), ["from-first"]);
}

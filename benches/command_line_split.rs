// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command-line splitting and `Command` display/parse.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use subpiper_command::{Command, split_command_line};

// ── Inputs ──────────────────────────────────────────────────────────────

const SIMPLE: &str = "cargo build --release --target x86_64-unknown-linux-gnu";
const QUOTED: &str = r#"git commit -m "fix: handle \"quoted\" words" --author 'A. Person <a@example.com>'"#;
const ESCAPED: &str = r"ls my\ dir/with\ spaces another\\path plain";

fn long_line() -> String {
    (0..200)
        .map(|i| format!("\"arg number {i}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Benches ─────────────────────────────────────────────────────────────

fn bench_split(c: &mut Criterion) {
    let long = long_line();
    let mut group = c.benchmark_group("split_command_line");
    group.bench_function("simple", |b| b.iter(|| split_command_line(black_box(SIMPLE))));
    group.bench_function("quoted", |b| b.iter(|| split_command_line(black_box(QUOTED))));
    group.bench_function("escaped", |b| b.iter(|| split_command_line(black_box(ESCAPED))));
    group.bench_function("long_200_args", |b| {
        b.iter(|| split_command_line(black_box(&long)))
    });
    group.finish();
}

fn bench_display_roundtrip(c: &mut Criterion) {
    let cmd = Command::new("printf")
        .arg("%s\\n")
        .arg("needs quoting")
        .arg("")
        .arg("plain");
    c.bench_function("command_display_parse", |b| {
        b.iter(|| {
            let text = black_box(&cmd).to_string();
            Command::parse(&text)
        })
    });
}

criterion_group!(benches, bench_split, bench_display_roundtrip);
criterion_main!(benches);

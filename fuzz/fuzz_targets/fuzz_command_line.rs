// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz command-line splitting.
//!
//! 1. `split_command_line` never panics.
//! 2. A parsed `Command` displays to a line that parses back to itself.
#![no_main]
use libfuzzer_sys::fuzz_target;
use subpiper_command::{Command, split_command_line};

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    let _ = split_command_line(line);

    if let Ok(cmd) = Command::parse(line) {
        let shown = cmd.to_string();
        let again = Command::parse(&shown).expect("displayed command must parse");
        assert_eq!(cmd, again, "display/parse round-trip for {shown:?}");
    }
});

// SPDX-License-Identifier: MIT OR Apache-2.0
//! UTF-8 line decoding with a configurable policy for malformed input.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do with a line that is not valid UTF-8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Substitute U+FFFD for each malformed sequence and deliver the line.
    #[default]
    Replace,
    /// Drop the malformed line and carry on with the next one.
    Skip,
}

impl DecodePolicy {
    /// Accepted spellings, for help text and validation.
    pub const NAMES: &'static [&'static str] = &["replace", "skip"];
}

impl fmt::Display for DecodePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Replace => "replace",
            Self::Skip => "skip",
        })
    }
}

impl FromStr for DecodePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" | "lossy" => Ok(Self::Replace),
            "skip" | "drop" => Ok(Self::Skip),
            other => Err(format!("unknown decode policy: {other}")),
        }
    }
}

/// Result of decoding one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedLine<'a> {
    /// The bytes were valid UTF-8.
    Clean(&'a str),
    /// Malformed sequences were replaced with U+FFFD.
    Repaired(String),
    /// The line was malformed and the policy says to drop it.
    Dropped,
}

/// Remove one trailing `\n` and, if present, the `\r` just before it.
pub fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Decode one line's bytes (terminator already stripped).
pub fn decode_line(bytes: &[u8], policy: DecodePolicy) -> DecodedLine<'_> {
    match std::str::from_utf8(bytes) {
        Ok(s) => DecodedLine::Clean(s),
        Err(_) => match policy {
            DecodePolicy::Replace => {
                DecodedLine::Repaired(String::from_utf8_lossy(bytes).into_owned())
            }
            DecodePolicy::Skip => DecodedLine::Dropped,
        },
    }
}

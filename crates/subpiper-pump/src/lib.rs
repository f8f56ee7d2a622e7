// SPDX-License-Identifier: MIT OR Apache-2.0
//! subpiper-pump
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Line pumps for child process pipes. A [`StreamPump`] owns one pipe end,
//! reads it until end-of-stream and calls a [`LineCallback`] once per line
//! the moment the line's terminator arrives.

pub mod callback;
pub mod decode;
pub mod pump;

pub use callback::{BoxError, CallbackFailure, LineCallback};
pub use decode::{DecodePolicy, DecodedLine, decode_line, strip_terminator};
pub use pump::{PumpError, PumpOptions, PumpReport, PumpState, StreamPump};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the child's output streams a pump drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl StreamKind {
    /// Lowercase name, as used in log fields and JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

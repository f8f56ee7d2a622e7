// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-line callbacks and the failures they can report.

use std::any::Any;
use std::fmt;
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::StreamKind;

/// Boxed error type accepted from fallible callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

type LineFn = dyn FnMut(&str) -> Result<(), BoxError> + Send + 'static;

/// A callback that failed, either by returning an error or by panicking.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CallbackFailure {
    message: String,
    panicked: bool,
}

impl CallbackFailure {
    /// A failure reported through an error value.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            panicked: false,
        }
    }

    /// A failure recovered from a panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("callback panicked: {s}")
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("callback panicked: {s}")
        } else {
            "callback panicked".to_string()
        };
        Self {
            message,
            panicked: true,
        }
    }

    /// Human-readable description of the failure.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// `true` if the callback panicked rather than returning an error.
    pub fn panicked(&self) -> bool {
        self.panicked
    }
}

/// Caller-supplied handler for one stream's lines.
///
/// Called on a blocking-pool thread owned by the stream's pump, never on an
/// async worker and never on the caller's thread. Calls are strictly
/// sequential for a given stream.
pub struct LineCallback {
    inner: Box<LineFn>,
}

impl LineCallback {
    /// Wrap a callback that cannot fail (panics are still caught).
    pub fn new<F>(mut f: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        Self {
            inner: Box::new(move |line: &str| -> Result<(), BoxError> {
                f(line);
                Ok(())
            }),
        }
    }

    /// Wrap a callback that reports failure through its return value.
    pub fn fallible<F, E>(mut f: F) -> Self
    where
        F: FnMut(&str) -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self {
            inner: Box::new(move |line: &str| -> Result<(), BoxError> {
                f(line).map_err(Into::into)
            }),
        }
    }

    /// A callback that drops every line.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    /// Echo each line to this process's own stdout or stderr.
    pub fn echo(stream: StreamKind) -> Self {
        Self::fallible(move |line: &str| -> std::io::Result<()> {
            match stream {
                StreamKind::Stdout => writeln!(std::io::stdout().lock(), "{line}"),
                StreamKind::Stderr => writeln!(std::io::stderr().lock(), "{line}"),
            }
        })
    }

    /// Invoke the callback, turning both error returns and panics into a
    /// [`CallbackFailure`].
    pub fn invoke(&mut self, line: &str) -> Result<(), CallbackFailure> {
        match catch_unwind(AssertUnwindSafe(|| (self.inner)(line))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CallbackFailure::new(e.to_string())),
            Err(payload) => Err(CallbackFailure::from_panic(payload)),
        }
    }
}

impl fmt::Debug for LineCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineCallback").finish_non_exhaustive()
    }
}

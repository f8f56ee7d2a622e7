// SPDX-License-Identifier: MIT OR Apache-2.0
use std::io;

use subpiper_command::CommandError;
use subpiper_pump::{CallbackFailure, PumpError, StreamKind};
use thiserror::Error;

use crate::lifecycle::LifecycleError;

/// Exit code handed to a completion callback when the run failed before an
/// exit code could be reported.
pub const FAILED_RUN_EXIT_CODE: i32 = -1;

/// Errors from launching, pumping and waiting on a child process.
#[derive(Debug, Error)]
pub enum SubpiperError {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{stream} callback failed (child exited with {exit_code}): {failure}")]
    Callback {
        stream: StreamKind,
        exit_code: i32,
        #[source]
        failure: CallbackFailure,
    },

    #[error("completion callback failed: {0}")]
    CompletionCallback(#[source] CallbackFailure),

    #[error("child {0} was not captured")]
    MissingPipe(StreamKind),

    #[error(transparent)]
    Stream(#[from] PumpError),

    #[error("failed to wait for child: {0}")]
    Wait(#[source] io::Error),

    #[error("{stream} pump task did not finish: {source}")]
    Join {
        stream: StreamKind,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("blocking run called from inside an async runtime; await `run()` instead")]
    NestedRuntime,

    #[error("failed to start background run thread: {0}")]
    Thread(#[source] io::Error),

    #[error("background run thread panicked")]
    ThreadPanicked,

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl SubpiperError {
    /// The child's exit code, for errors raised after it was collected.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Callback { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// `true` if the child never started.
    pub fn is_launch(&self) -> bool {
        matches!(self, Self::Launch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_error_names_program() {
        let err = SubpiperError::Launch {
            program: "nope".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        };
        assert!(err.is_launch());
        assert_eq!(err.exit_code(), None);
        assert_eq!(err.to_string(), "failed to launch `nope`: No such file or directory");
    }

    #[test]
    fn callback_error_carries_exit_code() {
        let err = SubpiperError::Callback {
            stream: StreamKind::Stderr,
            exit_code: 3,
            failure: CallbackFailure::new("disk full"),
        };
        assert_eq!(err.exit_code(), Some(3));
        assert_eq!(
            err.to_string(),
            "stderr callback failed (child exited with 3): disk full"
        );
    }

    #[test]
    fn command_error_converts() {
        let err: SubpiperError = CommandError::Empty.into();
        assert_eq!(err.to_string(), "command line is empty");
    }
}

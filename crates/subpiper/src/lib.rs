// SPDX-License-Identifier: MIT OR Apache-2.0
//! subpiper
//!
//! Launch a child process and receive its stdout and stderr as separate,
//! unbuffered lines. Each stream has its own pump, so a chatty stderr never
//! holds up stdout and a line reaches its callback as soon as the child
//! writes its newline.
//!
//! [`Subpiper`] is the entry point. It runs blocking
//! ([`Subpiper::run_blocking`]), async ([`Subpiper::run`]) or on a background
//! thread with a completion callback ([`Subpiper::spawn`]).
#![deny(unsafe_code)]

pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod path_env;
pub mod session;

pub use coordinator::{RunHandle, RunOutput, Subpiper};
pub use error::{FAILED_RUN_EXIT_CODE, SubpiperError};
pub use lifecycle::{LifecycleError, RunLifecycle, RunState, RunTransition};
pub use path_env::{EffectiveEnvironment, PATH_SEPARATOR, PATH_VAR};
pub use session::{ProcessSession, RunSummary, SessionOptions, exit_code_of};

pub use subpiper_command::{Command, CommandError, split_command_line};
pub use subpiper_pump::{
    BoxError, CallbackFailure, DecodePolicy, LineCallback, PumpReport, StreamKind,
};

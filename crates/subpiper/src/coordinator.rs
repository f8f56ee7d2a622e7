// SPDX-License-Identifier: MIT OR Apache-2.0
//! The public entry point: configure a run, then execute it blocking, async
//! or on a background thread.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::thread;

use serde::{Deserialize, Serialize};
use subpiper_command::Command;
use subpiper_pump::{BoxError, CallbackFailure, DecodePolicy, LineCallback, StreamKind};
use tracing::{debug, error};

use crate::error::{FAILED_RUN_EXIT_CODE, SubpiperError};
use crate::path_env::EffectiveEnvironment;
use crate::session::{ProcessSession, RunSummary, SessionOptions};

const BACKGROUND_THREAD_NAME: &str = "subpiper-run";
const RUNTIME_WORKERS: usize = 2;

/// Exit code and every line the child printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    /// Exit code of the child.
    pub exit_code: i32,
    /// Stdout lines, terminators stripped.
    pub stdout: Vec<String>,
    /// Stderr lines, terminators stripped.
    pub stderr: Vec<String>,
}

impl From<RunSummary> for RunOutput {
    fn from(summary: RunSummary) -> Self {
        Self {
            exit_code: summary.exit_code,
            stdout: summary.stdout.captured.unwrap_or_default(),
            stderr: summary.stderr.captured.unwrap_or_default(),
        }
    }
}

/// Builder and runner for one child process.
///
/// ```no_run
/// use subpiper::{Command, Subpiper};
///
/// let code = Subpiper::new(Command::new("echo").arg("magic"))
///     .on_stdout(|line| assert_eq!(line, "magic"))
///     .run_blocking()?;
/// assert_eq!(code, 0);
/// # Ok::<(), subpiper::SubpiperError>(())
/// ```
#[derive(Debug)]
pub struct Subpiper {
    command: Command,
    extra_paths: Vec<PathBuf>,
    on_stdout: Option<LineCallback>,
    on_stderr: Option<LineCallback>,
    decode: DecodePolicy,
    silent: bool,
    hide_console: bool,
    max_line_bytes: Option<usize>,
}

impl Subpiper {
    /// Prepare a run of `command`.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            extra_paths: Vec::new(),
            on_stdout: None,
            on_stderr: None,
            decode: DecodePolicy::default(),
            silent: false,
            hide_console: true,
            max_line_bytes: None,
        }
    }

    /// Prepare a run of a command line such as `"git status --short"`.
    pub fn parse(line: &str) -> Result<Self, SubpiperError> {
        Ok(Self::new(Command::parse(line)?))
    }

    /// The command this run will launch.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Prepend one directory to the child's executable search path.
    /// Repeated calls keep their order.
    pub fn extra_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_paths.push(dir.into());
        self
    }

    /// Prepend several directories, in order.
    pub fn extra_paths<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.extra_paths.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Run the child in `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.command = self.command.current_dir(dir);
        self
    }

    /// Handle stdout lines with `f`.
    pub fn on_stdout<F>(self, f: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.stdout_callback(LineCallback::new(f))
    }

    /// Handle stderr lines with `f`.
    pub fn on_stderr<F>(self, f: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.stderr_callback(LineCallback::new(f))
    }

    /// Handle stdout lines with a callback that may fail.
    pub fn try_on_stdout<F, E>(self, f: F) -> Self
    where
        F: FnMut(&str) -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.stdout_callback(LineCallback::fallible(f))
    }

    /// Handle stderr lines with a callback that may fail.
    pub fn try_on_stderr<F, E>(self, f: F) -> Self
    where
        F: FnMut(&str) -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.stderr_callback(LineCallback::fallible(f))
    }

    /// Use a prepared [`LineCallback`] for stdout.
    pub fn stdout_callback(mut self, callback: LineCallback) -> Self {
        self.on_stdout = Some(callback);
        self
    }

    /// Use a prepared [`LineCallback`] for stderr.
    pub fn stderr_callback(mut self, callback: LineCallback) -> Self {
        self.on_stderr = Some(callback);
        self
    }

    /// How malformed UTF-8 is handled.
    pub fn decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode = policy;
        self
    }

    /// Discard lines of streams that have no callback instead of echoing them.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Hide the child's console window on Windows. On by default.
    pub fn hide_console(mut self, hide: bool) -> Self {
        self.hide_console = hide;
        self
    }

    /// Deliver lines longer than `max` bytes in pieces instead of buffering
    /// them whole.
    pub fn max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = Some(max);
        self
    }

    /// Run to completion and return the exit code.
    pub async fn run(self) -> Result<i32, SubpiperError> {
        Ok(self.execute(false).await?.exit_code)
    }

    /// Run to completion and return the exit code with every line printed.
    pub async fn output(self) -> Result<RunOutput, SubpiperError> {
        Ok(self.execute(true).await?.into())
    }

    /// Run to completion and return the full [`RunSummary`].
    pub async fn run_summary(self) -> Result<RunSummary, SubpiperError> {
        self.execute(false).await
    }

    /// Blocking form of [`run`](Self::run).
    ///
    /// Uses a private runtime, so it must not be called from async code.
    pub fn run_blocking(self) -> Result<i32, SubpiperError> {
        block_on_private(self.execute(false)).map(|s| s.exit_code)
    }

    /// Blocking form of [`output`](Self::output).
    pub fn output_blocking(self) -> Result<RunOutput, SubpiperError> {
        block_on_private(self.execute(true)).map(Into::into)
    }

    /// Start the run on a background thread and return at once.
    ///
    /// `on_finished` is called exactly once from that thread, after every
    /// line callback has returned, with the exit code or
    /// [`FAILED_RUN_EXIT_CODE`] if the run failed. The error itself is
    /// logged and available from [`RunHandle::join`].
    pub fn spawn<F>(self, on_finished: F) -> Result<RunHandle, SubpiperError>
    where
        F: FnOnce(i32) + Send + 'static,
    {
        let program = self.command.get_program().to_string();
        let thread = thread::Builder::new()
            .name(BACKGROUND_THREAD_NAME.into())
            .spawn(move || {
                let result = block_on_private(self.execute(false));
                let code = match &result {
                    Ok(summary) => summary.exit_code,
                    Err(e) => {
                        error!(target: "subpiper", %program, error = %e, "background run failed");
                        FAILED_RUN_EXIT_CODE
                    }
                };
                match catch_unwind(AssertUnwindSafe(|| on_finished(code))) {
                    Ok(()) => result,
                    Err(payload) => {
                        let failure = CallbackFailure::from_panic(payload);
                        error!(target: "subpiper", %program, error = %failure, "completion callback failed");
                        // A run error takes precedence over the callback's.
                        result.and(Err(SubpiperError::CompletionCallback(failure)))
                    }
                }
            })
            .map_err(SubpiperError::Thread)?;
        Ok(RunHandle { thread })
    }

    async fn execute(self, capture: bool) -> Result<RunSummary, SubpiperError> {
        let Self {
            command,
            extra_paths,
            on_stdout,
            on_stderr,
            decode,
            silent,
            hide_console,
            max_line_bytes,
        } = self;

        debug!(
            target: "subpiper",
            command = %command,
            extra_paths = extra_paths.len(),
            "starting run"
        );
        let env = EffectiveEnvironment::from_current(&extra_paths);
        let on_stdout = on_stdout.unwrap_or_else(|| default_sink(StreamKind::Stdout, silent));
        let on_stderr = on_stderr.unwrap_or_else(|| default_sink(StreamKind::Stderr, silent));
        let options = SessionOptions {
            decode,
            capture,
            hide_console,
            max_line_bytes,
        };

        let session = ProcessSession::launch(&command, &env, on_stdout, on_stderr, options).await?;
        session.await_completion().await
    }
}

fn default_sink(stream: StreamKind, silent: bool) -> LineCallback {
    if silent {
        LineCallback::discard()
    } else {
        LineCallback::echo(stream)
    }
}

fn block_on_private<T>(
    fut: impl Future<Output = Result<T, SubpiperError>>,
) -> Result<T, SubpiperError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(SubpiperError::NestedRuntime);
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(RUNTIME_WORKERS)
        .enable_all()
        .build()
        .map_err(SubpiperError::Runtime)?;
    runtime.block_on(fut)
}

/// Handle to a run started with [`Subpiper::spawn`].
///
/// Dropping the handle detaches the run; the completion callback still fires.
#[derive(Debug)]
pub struct RunHandle {
    thread: thread::JoinHandle<Result<RunSummary, SubpiperError>>,
}

impl RunHandle {
    /// `true` once the run and its completion callback have finished.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the background thread and return the run's outcome.
    pub fn join(self) -> Result<RunSummary, SubpiperError> {
        self.thread
            .join()
            .map_err(|_| SubpiperError::ThreadPanicked)?
    }
}

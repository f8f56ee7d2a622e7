// SPDX-License-Identifier: MIT OR Apache-2.0
//! One child process plus the two pumps draining it.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use subpiper_command::Command;
use subpiper_pump::{
    DecodePolicy, LineCallback, PumpError, PumpOptions, PumpReport, StreamKind, StreamPump,
};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{FAILED_RUN_EXIT_CODE, SubpiperError};
use crate::lifecycle::{RunLifecycle, RunState, RunTransition};
use crate::path_env::EffectiveEnvironment;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Knobs for a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Handling of malformed UTF-8 on both streams.
    pub decode: DecodePolicy,
    /// Keep a copy of every delivered line in the reports.
    pub capture: bool,
    /// Suppress the console window for the child (Windows only).
    pub hide_console: bool,
    /// Cap on a buffered line; longer lines arrive in pieces.
    pub max_line_bytes: Option<usize>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            decode: DecodePolicy::default(),
            capture: false,
            hide_console: true,
            max_line_bytes: None,
        }
    }
}

/// Everything known about a run once it has completed.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Exit code of the child (`128 + signal` for a signalled Unix child).
    pub exit_code: i32,
    /// What the stdout pump saw.
    pub stdout: PumpReport,
    /// What the stderr pump saw.
    pub stderr: PumpReport,
    /// Wall time from launch to completion.
    pub duration: Duration,
    /// Lifecycle history of the run.
    pub transitions: Vec<RunTransition>,
}

type PumpHandle = JoinHandle<Result<PumpReport, PumpError>>;

/// A launched child and its two pumps.
///
/// Owns the child exclusively. Dropping a session does not kill the child.
#[derive(Debug)]
pub struct ProcessSession {
    program: String,
    child: Child,
    stdout: PumpHandle,
    stderr: PumpHandle,
    lifecycle: RunLifecycle,
}

impl ProcessSession {
    /// Start `command` with `env` as its complete environment and begin
    /// pumping both streams.
    ///
    /// Must be called from within a Tokio runtime; the pumps are spawned on
    /// it and the callbacks run on its worker threads.
    pub async fn launch(
        command: &Command,
        env: &EffectiveEnvironment,
        on_stdout: LineCallback,
        on_stderr: LineCallback,
        options: SessionOptions,
    ) -> Result<Self, SubpiperError> {
        let mut lifecycle = RunLifecycle::new();
        lifecycle.transition(RunState::Launching, None)?;
        let program = command.get_program().to_string();

        let mut cmd = tokio::process::Command::new(&program);
        cmd.args(command.get_args())
            .env_clear()
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        if let Some(cwd) = command.get_current_dir() {
            cmd.current_dir(cwd);
        }
        #[cfg(windows)]
        if options.hide_console {
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                warn!(target: "subpiper.session", %program, error = %source, "launch failed");
                lifecycle.transition(RunState::Completed, Some(source.to_string()))?;
                return Err(SubpiperError::Launch { program, source });
            }
        };
        info!(target: "subpiper.session", %program, pid = child.id(), "child launched");

        let stdout = child
            .stdout
            .take()
            .ok_or(SubpiperError::MissingPipe(StreamKind::Stdout))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(SubpiperError::MissingPipe(StreamKind::Stderr))?;

        let pump_options = PumpOptions {
            decode: options.decode,
            capture: options.capture,
            max_line_bytes: options.max_line_bytes,
        };
        let stdout = tokio::spawn(
            StreamPump::new(StreamKind::Stdout, stdout, on_stdout, pump_options).run(),
        );
        let stderr = tokio::spawn(
            StreamPump::new(StreamKind::Stderr, stderr, on_stderr, pump_options).run(),
        );
        lifecycle.transition(RunState::Pumping, None)?;

        Ok(Self {
            program,
            child,
            stdout,
            stderr,
            lifecycle,
        })
    }

    /// OS process id, while the child has not been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.lifecycle.state()
    }

    /// Wait for the child to exit and for both pumps to reach end-of-stream.
    ///
    /// Every line callback has returned by the time this resolves. A failed
    /// callback is reported as [`SubpiperError::Callback`] after the exit code
    /// is known; the child is never killed.
    pub async fn await_completion(self) -> Result<RunSummary, SubpiperError> {
        let Self {
            program,
            mut child,
            stdout,
            stderr,
            lifecycle,
        } = self;

        let waited = child.wait().await;
        settle(program, waited, stdout, stderr, lifecycle).await
    }
}

/// Turn the wait result and both pump outcomes into the run's result.
/// Both pumps are joined on every path, so no callback outlives the run.
async fn settle(
    program: String,
    waited: std::io::Result<ExitStatus>,
    stdout: PumpHandle,
    stderr: PumpHandle,
    mut lifecycle: RunLifecycle,
) -> Result<RunSummary, SubpiperError> {
    let status = match waited {
        Ok(status) => status,
        Err(e) => {
            warn!(target: "subpiper.session", %program, error = %e, "wait failed");
            let _ = join_pump(StreamKind::Stdout, stdout).await;
            let _ = join_pump(StreamKind::Stderr, stderr).await;
            lifecycle.transition(RunState::Completed, Some(e.to_string()))?;
            return Err(SubpiperError::Wait(e));
        }
    };
    let exit_code = exit_code_of(status);
    lifecycle.transition(RunState::Exited, Some(format!("exit code {exit_code}")))?;

    let stdout = join_pump(StreamKind::Stdout, stdout).await;
    let stderr = join_pump(StreamKind::Stderr, stderr).await;
    let (stdout, stderr) = match (stdout, stderr) {
        (Ok(out), Ok(err)) => (out, err),
        (Err(e), _) | (_, Err(e)) => {
            lifecycle.transition(RunState::Completed, Some(e.to_string()))?;
            return Err(e);
        }
    };

    let failure = [&stdout, &stderr]
        .into_iter()
        .find_map(|r| r.failure.clone().map(|f| (r.stream, f)));
    let reason = failure.as_ref().map(|(stream, f)| format!("{stream} callback failed: {f}"));
    lifecycle.transition(RunState::Completed, reason)?;

    let duration = lifecycle.elapsed().unwrap_or_default();
    debug!(
        target: "subpiper.session",
        %program,
        exit_code,
        stdout_lines = stdout.lines,
        stderr_lines = stderr.lines,
        elapsed_ms = duration.as_millis() as u64,
        "run completed"
    );

    if let Some((stream, failure)) = failure {
        return Err(SubpiperError::Callback {
            stream,
            exit_code,
            failure,
        });
    }

    Ok(RunSummary {
        exit_code,
        stdout,
        stderr,
        duration,
        transitions: lifecycle.into_history(),
    })
}

async fn join_pump(stream: StreamKind, handle: PumpHandle) -> Result<PumpReport, SubpiperError> {
    let report = handle
        .await
        .map_err(|source| SubpiperError::Join { stream, source })??;
    Ok(report)
}

/// Integer exit code for `status`; `128 + signal` for a signalled Unix child.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    FAILED_RUN_EXIT_CODE
}

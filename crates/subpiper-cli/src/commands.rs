// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subcommand implementations.

use anyhow::{Context, Result, anyhow, bail};
use std::io::Write;
use std::path::{Path, PathBuf};
use subpiper::{Command, DecodePolicy, LineCallback, RunSummary, StreamKind, Subpiper};
use subpiper_config::{SubpiperConfig, load_config, validate_config};
use tracing::debug;

use crate::format::{OutputFormat, format_line, format_summary};

/// Everything `subpiper run` needs, after flag parsing.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub line: Option<String>,
    pub argv: Vec<String>,
    pub paths: Vec<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub decode: Option<DecodePolicy>,
    pub silent: bool,
    pub max_line_bytes: Option<usize>,
    pub background: bool,
    pub format: OutputFormat,
}

fn build_command(req: &RunRequest) -> Result<Command> {
    match (&req.line, req.argv.is_empty()) {
        (Some(_), false) => bail!("pass either --line or a command after `--`, not both"),
        (Some(line), true) => Command::parse(line).context("parse --line"),
        (None, false) => Command::from_argv(req.argv.clone()).context("build command"),
        (None, true) => bail!("no command given; use --line \"cmd\" or `-- PROGRAM ARGS...`"),
    }
}

fn printer(format: OutputFormat, stream: StreamKind) -> LineCallback {
    LineCallback::fallible(move |line: &str| -> std::io::Result<()> {
        let text = format_line(format, stream, line);
        writeln!(std::io::stdout().lock(), "{text}")
    })
}

/// Assemble a [`Subpiper`] from the request and the loaded config.
pub fn build_run(req: &RunRequest, config: &SubpiperConfig) -> Result<Subpiper> {
    let mut command = build_command(req)?;
    if let Some(cwd) = &req.cwd {
        command = command.current_dir(cwd);
    }

    let decode = match req.decode {
        Some(policy) => policy,
        None => config.decode_policy().map_err(|e| anyhow!(e))?,
    };
    let silent = req.silent || config.silent.unwrap_or(false);

    let mut run = Subpiper::new(command)
        .extra_paths(req.paths.iter().cloned())
        .extra_paths(config.extra_paths.iter().map(PathBuf::from))
        .decode_policy(decode)
        .silent(silent)
        .hide_console(config.hide_console.unwrap_or(true));
    if let Some(max) = req.max_line_bytes {
        run = run.max_line_bytes(max);
    }
    if !silent {
        run = run
            .stdout_callback(printer(req.format, StreamKind::Stdout))
            .stderr_callback(printer(req.format, StreamKind::Stderr));
    }
    Ok(run)
}

/// `subpiper run`: returns the child's exit code.
pub async fn cmd_run(req: RunRequest, config: &SubpiperConfig) -> Result<i32> {
    let run = build_run(&req, config)?;
    debug!(target: "subpiper", command = %run.command(), background = req.background, "run");

    let summary = if req.background {
        run_in_background(run).await?
    } else {
        run.run_summary().await?
    };

    if req.format == OutputFormat::Json {
        println!("{}", format_summary(&summary));
    }
    Ok(summary.exit_code)
}

async fn run_in_background(run: Subpiper) -> Result<RunSummary> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = run.spawn(move |code| {
        let _ = tx.send(code);
    })?;
    let code = rx.await.context("completion callback was never called")?;
    debug!(target: "subpiper", exit_code = code, "completion callback fired");
    let summary = tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("join background run")??;
    Ok(summary)
}

/// `subpiper schema`: print the config file's JSON schema.
pub fn cmd_schema() -> Result<()> {
    let schema = schemars::schema_for!(SubpiperConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// `subpiper config check`: load, validate, print warnings.
pub fn cmd_config_check(path: Option<&Path>) -> Result<()> {
    let config = load_config(path).context("load config")?;
    let warnings = validate_config(&config).context("validate config")?;
    for w in &warnings {
        println!("warning: {w}");
    }
    println!("config ok ({} warning(s))", warnings.len());
    Ok(())
}

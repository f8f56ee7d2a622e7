// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
mod commands;
mod format;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use subpiper::DecodePolicy;
use subpiper_config::{SubpiperConfig, load_config};
use tracing_subscriber::EnvFilter;

use crate::commands::{RunRequest, cmd_config_check, cmd_run, cmd_schema};
use crate::format::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "subpiper", version, about = "Run a command and stream its output line by line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Config file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command, printing each stdout/stderr line as it arrives.
    Run {
        /// Directory to prepend to the child's search path. Can be repeated.
        #[arg(long = "path")]
        paths: Vec<PathBuf>,

        /// Working directory for the child.
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Handling of malformed UTF-8.
        #[arg(long, value_enum)]
        decode: Option<DecodeArg>,

        /// Discard the child's output; exit with its code.
        #[arg(long)]
        silent: bool,

        /// Deliver lines longer than this many bytes in pieces.
        #[arg(long, value_name = "BYTES", value_parser = clap::value_parser!(u64).range(1..))]
        max_line_bytes: Option<u64>,

        /// Use the non-blocking mode and wait for its completion callback.
        #[arg(long)]
        background: bool,

        /// Print JSON lines instead of text.
        #[arg(long)]
        json: bool,

        /// Command as a single string, split like a shell would (no expansion).
        #[arg(long)]
        line: Option<String>,

        /// Program and arguments.
        #[arg(last = true)]
        argv: Vec<String>,
    },

    /// Print the JSON schema of the config file.
    Schema,

    /// Config file operations.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Load and validate the config, printing any warnings.
    Check,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DecodeArg {
    Replace,
    Skip,
}

impl From<DecodeArg> for DecodePolicy {
    fn from(v: DecodeArg) -> Self {
        match v {
            DecodeArg::Replace => DecodePolicy::Replace,
            DecodeArg::Skip => DecodePolicy::Skip,
        }
    }
}

fn init_tracing(debug: bool, config: &SubpiperConfig) {
    let filter = if debug {
        EnvFilter::new("subpiper=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = config.log_level.as_deref().unwrap_or("info");
            EnvFilter::new(format!("subpiper={level}"))
        })
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Schema => cmd_schema(),
        Commands::Config {
            action: ConfigAction::Check,
        } => cmd_config_check(cli.config.as_deref()),
        Commands::Run {
            paths,
            cwd,
            decode,
            silent,
            max_line_bytes,
            background,
            json,
            line,
            argv,
        } => {
            let config = load_config(cli.config.as_deref()).context("load config")?;
            init_tracing(cli.debug, &config);

            let req = RunRequest {
                line,
                argv,
                paths,
                cwd,
                decode: decode.map(Into::into),
                silent,
                max_line_bytes: max_line_bytes.and_then(|n| usize::try_from(n).ok()),
                background,
                format: if json {
                    OutputFormat::Json
                } else {
                    OutputFormat::Text
                },
            };
            let code = cmd_run(req, &config).await?;
            std::io::stdout().flush().context("flush stdout")?;
            std::process::exit(code);
        }
    }
}

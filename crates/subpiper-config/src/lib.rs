// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for subpiper.
//!
//! [`SubpiperConfig`] carries the defaults applied to every run started by
//! the `subpiper` binary. It is loaded from TOML, overridden from
//! `SUBPIPER_*` environment variables and checked by [`validate_config`],
//! which separates hard errors from advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use subpiper_pump::DecodePolicy;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file could not be read.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file is not valid TOML or has fields of the wrong type.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory issues that do not stop a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// An extra search-path entry does not name an existing directory.
    MissingExtraPath {
        /// The entry as written.
        path: String,
    },
    /// An extra search-path entry is relative and resolves against the
    /// child's working directory.
    RelativeExtraPath {
        /// The entry as written.
        path: String,
    },
    /// The same entry appears more than once; only the first can matter.
    DuplicateExtraPath {
        /// The repeated entry.
        path: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingExtraPath { path } => {
                write!(f, "extra path '{path}' is not an existing directory")
            }
            ConfigWarning::RelativeExtraPath { path } => {
                write!(f, "extra path '{path}' is relative to the child's working directory")
            }
            ConfigWarning::DuplicateExtraPath { path } => {
                write!(f, "extra path '{path}' is listed more than once")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config type
// ---------------------------------------------------------------------------

/// Defaults for runs started by the `subpiper` binary.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SubpiperConfig {
    /// Log level filter (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Directories prepended, in order, to the child's search path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_paths: Vec<String>,

    /// Handling of malformed UTF-8: `"replace"` or `"skip"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_policy: Option<String>,

    /// Discard output of streams without an explicit handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silent: Option<bool>,

    /// Hide the child's console window on Windows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_console: Option<bool>,
}

impl Default for SubpiperConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".into()),
            extra_paths: Vec::new(),
            decode_policy: None,
            silent: None,
            hide_console: None,
        }
    }
}

impl SubpiperConfig {
    /// The configured decode policy, or the default when unset.
    ///
    /// Returns an error message for unknown names; [`validate_config`]
    /// reports the same problem up front.
    pub fn decode_policy(&self) -> Result<DecodePolicy, String> {
        match &self.decode_policy {
            Some(name) => name.parse(),
            None => Ok(DecodePolicy::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Environment variable overriding `log_level`.
pub const ENV_LOG_LEVEL: &str = "SUBPIPER_LOG_LEVEL";
/// Environment variable overriding `extra_paths`.
pub const ENV_EXTRA_PATHS: &str = "SUBPIPER_EXTRA_PATHS";
/// Environment variable overriding `decode_policy`.
pub const ENV_DECODE_POLICY: &str = "SUBPIPER_DECODE_POLICY";
/// Environment variable overriding `silent`.
pub const ENV_SILENT: &str = "SUBPIPER_SILENT";

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`SubpiperConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`SubpiperConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<SubpiperConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => SubpiperConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`SubpiperConfig`].
pub fn parse_toml(content: &str) -> Result<SubpiperConfig, ConfigError> {
    toml::from_str::<SubpiperConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply `SUBPIPER_*` overrides from the process environment.
///
/// Recognised variables:
/// - `SUBPIPER_LOG_LEVEL`
/// - `SUBPIPER_EXTRA_PATHS` (split on the platform path-list separator;
///   replaces the configured list)
/// - `SUBPIPER_DECODE_POLICY`
/// - `SUBPIPER_SILENT` (`1`/`true`/`yes`/`on` or `0`/`false`/`no`/`off`)
pub fn apply_env_overrides(config: &mut SubpiperConfig) {
    apply_env_overrides_from(config, |name| std::env::var(name).ok());
}

/// [`apply_env_overrides`] with a caller-supplied variable lookup.
pub fn apply_env_overrides_from<F>(config: &mut SubpiperConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(ENV_LOG_LEVEL) {
        config.log_level = Some(val);
    }
    if let Some(val) = lookup(ENV_EXTRA_PATHS) {
        config.extra_paths = std::env::split_paths(&val)
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
    }
    if let Some(val) = lookup(ENV_DECODE_POLICY) {
        config.decode_policy = Some(val);
    }
    if let Some(val) = lookup(ENV_SILENT)
        && let Some(flag) = parse_flag(&val)
    {
        config.silent = Some(flag);
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Unknown log levels, unknown decode policies and blank search-path entries
/// are hard errors; questionable search-path entries come back as warnings.
pub fn validate_config(config: &SubpiperConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    if let Some(ref policy) = config.decode_policy
        && policy.parse::<DecodePolicy>().is_err()
    {
        errors.push(format!(
            "invalid decode_policy '{policy}' (expected one of {})",
            DecodePolicy::NAMES.join(", ")
        ));
    }

    let mut seen = BTreeSet::new();
    for entry in &config.extra_paths {
        if entry.trim().is_empty() {
            errors.push("extra_paths entries must not be empty".into());
            continue;
        }
        if !seen.insert(entry.as_str()) {
            warnings.push(ConfigWarning::DuplicateExtraPath {
                path: entry.clone(),
            });
            continue;
        }
        let path = Path::new(entry);
        if path.is_relative() {
            warnings.push(ConfigWarning::RelativeExtraPath {
                path: entry.clone(),
            });
        } else if !path.is_dir() {
            warnings.push(ConfigWarning::MissingExtraPath {
                path: entry.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values in `overlay` take precedence over `base`.
///
/// Extra paths are concatenated with the overlay's entries first, so they
/// are searched before the base entries.
pub fn merge_configs(base: SubpiperConfig, overlay: SubpiperConfig) -> SubpiperConfig {
    let mut extra_paths = overlay.extra_paths;
    extra_paths.extend(base.extra_paths);
    SubpiperConfig {
        log_level: overlay.log_level.or(base.log_level),
        extra_paths,
        decode_policy: overlay.decode_policy.or(base.decode_policy),
        silent: overlay.silent.or(base.silent),
        hide_console: overlay.hide_console.or(base.hide_console),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

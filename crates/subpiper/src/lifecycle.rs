// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-run state machine. Runs move forward only; `Completed` is terminal and
//! reachable from every other state so a failed launch still finishes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Where a run is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing has happened yet.
    NotStarted,
    /// The child is being created.
    Launching,
    /// The child is running and both pumps are reading.
    Pumping,
    /// The child has exited; pumps may still be draining.
    Exited,
    /// Both pumps finished and the result is known (or the run failed).
    Completed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Launching => "launching",
            Self::Pumping => "pumping",
            Self::Exited => "exited",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// One recorded state change.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunTransition {
    /// State before the transition.
    pub from: RunState,
    /// State after the transition.
    pub to: RunState,
    /// RFC 3339 timestamp of the transition.
    pub timestamp: String,
    /// Optional note, e.g. the exit code or the launch error.
    pub reason: Option<String>,
}

/// Rejected transitions.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// The state machine does not allow this move.
    #[error("invalid run transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: RunState,
        /// Requested state.
        to: RunState,
    },
    /// The run is already in the requested state.
    #[error("run already in state {0}")]
    AlreadyInState(RunState),
}

/// Tracks one run's [`RunState`] and its transition history.
#[derive(Debug)]
pub struct RunLifecycle {
    state: RunState,
    history: Vec<RunTransition>,
    launched_at: Option<Instant>,
}

impl RunLifecycle {
    /// A lifecycle in [`RunState::NotStarted`].
    pub fn new() -> Self {
        Self {
            state: RunState::NotStarted,
            history: Vec::new(),
            launched_at: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Move to `to`, recording the transition.
    pub fn transition(&mut self, to: RunState, reason: Option<String>) -> Result<(), LifecycleError> {
        if self.state == to {
            return Err(LifecycleError::AlreadyInState(to));
        }
        if !self.can_transition(to) {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        let from = self.state;
        self.state = to;
        if to == RunState::Launching {
            self.launched_at = Some(Instant::now());
        }
        debug!(target: "subpiper", %from, %to, reason = reason.as_deref(), "run transition");
        self.history.push(RunTransition {
            from,
            to,
            timestamp: chrono::Utc::now().to_rfc3339(),
            reason,
        });
        Ok(())
    }

    /// `true` if moving from the current state to `to` is allowed.
    pub fn can_transition(&self, to: RunState) -> bool {
        if self.state == RunState::Completed {
            return false;
        }
        if to == RunState::Completed {
            return true;
        }
        matches!(
            (self.state, to),
            (RunState::NotStarted, RunState::Launching)
                | (RunState::Launching, RunState::Pumping)
                | (RunState::Pumping, RunState::Exited)
        )
    }

    /// Transitions so far, oldest first.
    pub fn history(&self) -> &[RunTransition] {
        &self.history
    }

    /// Consume the lifecycle, keeping only its history.
    pub fn into_history(self) -> Vec<RunTransition> {
        self.history
    }

    /// Time since the run entered [`RunState::Launching`].
    pub fn elapsed(&self) -> Option<Duration> {
        self.launched_at.map(|t| t.elapsed())
    }
}

impl Default for RunLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

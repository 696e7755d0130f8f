//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::run::{
    RunLimits, RunSettings, DEFAULT_KILL_GRACE, DEFAULT_MAX_INVOCATIONS, DEFAULT_PIPE_DRAIN,
    DEFAULT_STDERR_TAIL_LINES, DEFAULT_THROTTLE_INTERVAL,
};

/// Run coordination settings, in TOML-friendly units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// Minimum spacing between progress updates.
    pub throttle_ms: u64,
    /// Time between SIGTERM and SIGKILL after cancellation.
    pub kill_grace_ms: u64,
    /// How long to keep reading pipes after the process exits.
    pub pipe_drain_ms: u64,
    /// Invocation records kept per run.
    pub max_invocations: usize,
    /// Stderr lines kept per run.
    pub stderr_tail_lines: usize,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            throttle_ms: millis(DEFAULT_THROTTLE_INTERVAL),
            kill_grace_ms: millis(DEFAULT_KILL_GRACE),
            pipe_drain_ms: millis(DEFAULT_PIPE_DRAIN),
            max_invocations: DEFAULT_MAX_INVOCATIONS,
            stderr_tail_lines: DEFAULT_STDERR_TAIL_LINES,
        }
    }
}

impl RunConfig {
    /// Convert to the settings the coordinator consumes.
    #[must_use]
    pub fn settings(&self) -> RunSettings {
        RunSettings {
            throttle_interval: Duration::from_millis(self.throttle_ms),
            kill_grace: Duration::from_millis(self.kill_grace_ms),
            pipe_drain: Duration::from_millis(self.pipe_drain_ms),
            limits: RunLimits {
                max_invocations: self.max_invocations,
                stderr_tail_lines: self.stderr_tail_lines,
            },
        }
    }
}

/// Per-agent overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Executable name or path. Defaults to the agent's usual name.
    pub binary: Option<String>,
    /// Flags appended to every invocation.
    pub extra_args: Vec<String>,
    /// Regex patterns for stderr lines to drop, on top of the built-ins.
    pub stderr_ignore: Vec<String>,
}

/// Overrides for every supported agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentsConfig {
    pub codex: AgentConfig,
    pub claude: AgentConfig,
    pub gemini: AgentConfig,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DelegateConfig {
    pub run: RunConfig,
    pub agents: AgentsConfig,
}

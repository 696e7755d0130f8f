//! Adapters for external command-line agents.
//!
//! Each adapter knows three things about its agent: how to build the command
//! line for a task, how to decode its stdout dialect, and which stderr lines
//! are noise. Everything else is shared by the run coordinator.
//!
//! ```text
//! Coordinator::run(options)
//!     |
//!     +-- agent.command(request) --> CommandSpec --> AgentProcess
//!     +-- agent.protocol()        --> StreamParser (stdout)
//!     +-- agent.stderr_filter()   --> StderrLines  (stderr)
//! ```

mod claude;
mod codex;
mod gemini;

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::cli::{CommandSpec, NoiseFilter, Protocol};
use crate::config::{AgentConfig, AgentsConfig, ConfigError};

pub use claude::*;
pub use codex::*;
pub use gemini::*;

/// The work to hand to an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRequest {
    /// Task text, passed on the command line.
    pub task: String,
    /// Working directory for the agent process.
    pub working_dir: Option<PathBuf>,
    /// Model override.
    pub model: Option<String>,
    /// Session to resume, for agents that support it.
    pub resume: Option<String>,
    /// Extra flags appended after everything else.
    pub extra_args: Vec<String>,
}

impl TaskRequest {
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Default::default()
        }
    }
}

/// Adapter interface for an external agent CLI.
///
/// Object-safe so adapters can be selected at runtime as `Box<dyn Agent>`.
pub trait Agent: Send + Sync {
    /// Short name used in logs and run state (e.g. "codex").
    fn name(&self) -> &str;

    /// Build the command line for a task.
    fn command(&self, request: &TaskRequest) -> CommandSpec;

    /// Create a fresh stdout decoder for one run.
    fn protocol(&self) -> Box<dyn Protocol>;

    /// Patterns for stderr lines that should not be retained.
    fn stderr_filter(&self) -> NoiseFilter {
        NoiseFilter::default()
    }
}

/// Supported agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Codex,
    Claude,
    Gemini,
}

impl AgentKind {
    /// Construct the adapter for this kind from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` if a configured stderr pattern
    /// does not compile.
    pub fn build(self, config: &AgentsConfig) -> Result<Box<dyn Agent>, ConfigError> {
        Ok(match self {
            Self::Codex => Box::new(CodexAgent::from_config(&config.codex)?),
            Self::Claude => Box::new(ClaudeAgent::from_config(&config.claude)?),
            Self::Gemini => Box::new(GeminiAgent::from_config(&config.gemini)?),
        })
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        };
        f.write_str(s)
    }
}

/// Settings shared by every adapter.
#[derive(Debug, Clone)]
pub(crate) struct AdapterSetup {
    pub(crate) binary: String,
    pub(crate) extra_args: Vec<String>,
    pub(crate) filter: NoiseFilter,
}

impl AdapterSetup {
    /// Build from defaults only. Built-in patterns are known to compile.
    pub(crate) fn defaults(binary: &str, builtin_noise: &[&str]) -> Self {
        Self {
            binary: binary.to_string(),
            extra_args: Vec::new(),
            filter: NoiseFilter::new(builtin_noise).unwrap_or_default(),
        }
    }

    pub(crate) fn from_config(
        config: &AgentConfig,
        default_binary: &str,
        builtin_noise: &[&str],
    ) -> Result<Self, ConfigError> {
        let mut setup = Self::defaults(default_binary, builtin_noise);
        if let Some(binary) = &config.binary {
            setup.binary.clone_from(binary);
        }
        setup.extra_args.clone_from(&config.extra_args);
        for pattern in &config.stderr_ignore {
            let compiled = NoiseFilter::new([pattern]).map_err(|source| {
                ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                }
            })?;
            setup.filter = setup.filter.extend(compiled);
        }
        Ok(setup)
    }

    /// Append model/extra flags common to all adapters.
    pub(crate) fn finish(&self, spec: CommandSpec, request: &TaskRequest) -> CommandSpec {
        spec.opt("--model", request.model.as_deref())
            .args(self.extra_args.iter().cloned())
            .args(request.extra_args.iter().cloned())
            .working_dir(request.working_dir.clone())
    }
}

/// Flatten tool output that may be a string, an array of text blocks, or
/// arbitrary JSON.
pub(crate) fn output_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => {
            let texts: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("text").and_then(serde_json::Value::as_str))
                .collect();
            if texts.is_empty() {
                Some(value.to_string())
            } else {
                Some(texts.join("\n"))
            }
        }
        other => Some(other.to_string()),
    }
}

//! Normalized events decoded from agent stdout.
//!
//! Every supported agent speaks its own newline-delimited JSON dialect. The
//! per-agent protocols in [`crate::agents`] translate those dialects into the
//! closed set of [`NormalizedEvent`] variants defined here, which is the only
//! vocabulary the run coordinator understands.

use serde::{Deserialize, Serialize};

/// What sort of work an invocation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    /// A named tool call (MCP tool, file edit, search).
    Tool,
    /// A shell command executed by the agent.
    Command,
}

/// A tool or command invocation as announced by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationCall {
    /// Agent-assigned identifier, used to match the result.
    pub id: String,
    pub kind: InvocationKind,
    /// Tool name, or the shell name for commands.
    pub name: String,
    /// Tool arguments, or the command line as a JSON string.
    pub input: serde_json::Value,
}

/// The outcome of an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Identifier of the invocation this result closes.
    pub id: String,
    /// Call details, when the result line repeats them.
    ///
    /// Used to record invocations whose start was never observed.
    pub call: Option<InvocationCall>,
    pub output: Option<String>,
    pub exit_code: Option<i32>,
    pub is_error: bool,
}

/// Token accounting reported at the end of a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
    /// Cost in USD, for agents that report it.
    pub cost_usd: Option<f64>,
}

/// A single unit of meaning decoded from one stdout line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedEvent {
    /// The agent announced its session or thread identifier.
    SessionStarted { session_id: String },
    /// Streaming text of the current assistant message.
    ///
    /// `text` is always the cumulative text so far, whatever the agent's
    /// native delta semantics.
    MessageDelta { text: String },
    /// A finished assistant message.
    MessageComplete { text: String },
    InvocationStarted(InvocationCall),
    InvocationUpdated(InvocationCall),
    InvocationFinished(InvocationResult),
    /// The agent finished a turn.
    TurnCompleted { usage: Option<Usage> },
    /// The agent reported a semantic error.
    Error { message: String },
    /// A line that could not be mapped to any structured meaning.
    Raw { line: String },
}

impl NormalizedEvent {
    /// Returns the session ID if this event carries one.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SessionStarted { session_id } => Some(session_id),
            _ => None,
        }
    }

    /// Returns the invocation identifier for invocation events.
    #[must_use]
    pub fn invocation_id(&self) -> Option<&str> {
        match self {
            Self::InvocationStarted(call) | Self::InvocationUpdated(call) => Some(&call.id),
            Self::InvocationFinished(result) => Some(&result.id),
            _ => None,
        }
    }
}

//! Codex CLI adapter.
//!
//! Runs `codex exec --json <task>` and decodes its JSONL event stream.
//!
//! Zero-event lines: `turn.started`, and items of type `reasoning`,
//! `todo_list` and `error` (Codex uses error items for non-fatal warnings).

use serde::Deserialize;
use serde_json::Value;

use super::{output_text, AdapterSetup, Agent, TaskRequest};
use crate::cli::{
    CommandSpec, Decoded, InvocationCall, InvocationKind, InvocationResult, NoiseFilter,
    NormalizedEvent, Protocol, Usage,
};
use crate::config::{AgentConfig, ConfigError};

const DEFAULT_BINARY: &str = "codex";

const NOISE: &[&str] = &["^Reading prompt from stdin"];

/// Token usage as reported by `turn.completed`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CodexUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl From<CodexUsage> for Usage {
    fn from(usage: CodexUsage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            cached_input_tokens: usage.cached_input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd: None,
        }
    }
}

/// Error payload of `turn.failed`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CodexError {
    pub message: String,
}

/// A thread item, the unit Codex reports progress on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CodexItem {
    pub id: String,
    #[serde(flatten)]
    pub details: CodexItemDetails,
}

/// Item payload by item type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CodexItemDetails {
    AgentMessage {
        text: String,
    },
    Reasoning {
        #[serde(default)]
        text: String,
    },
    CommandExecution {
        command: String,
        #[serde(default)]
        aggregated_output: String,
        #[serde(default)]
        exit_code: Option<i32>,
        #[serde(default)]
        status: String,
    },
    McpToolCall {
        server: String,
        tool: String,
        #[serde(default)]
        arguments: Value,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<CodexError>,
        #[serde(default)]
        status: String,
    },
    FileChange {
        #[serde(default)]
        changes: Value,
        #[serde(default)]
        status: String,
    },
    WebSearch {
        query: String,
    },
    TodoList {
        #[serde(default)]
        items: Value,
    },
    Error {
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// Events emitted by `codex exec --json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum CodexEvent {
    #[serde(rename = "thread.started")]
    ThreadStarted { thread_id: String },
    #[serde(rename = "turn.started")]
    TurnStarted {},
    #[serde(rename = "turn.completed")]
    TurnCompleted {
        #[serde(default)]
        usage: Option<CodexUsage>,
    },
    #[serde(rename = "turn.failed")]
    TurnFailed { error: CodexError },
    #[serde(rename = "item.started")]
    ItemStarted { item: CodexItem },
    #[serde(rename = "item.updated")]
    ItemUpdated { item: CodexItem },
    #[serde(rename = "item.completed")]
    ItemCompleted { item: CodexItem },
    #[serde(rename = "error")]
    Error { message: String },
    /// Flat message form emitted by older releases.
    #[serde(rename = "agent_message")]
    AgentMessage {
        #[serde(alias = "message")]
        text: String,
    },
    /// Flat fragment form emitted by older releases.
    #[serde(rename = "agent_message_delta")]
    AgentMessageDelta { delta: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Started,
    Updated,
    Completed,
}

/// Decoder for the Codex event stream.
///
/// `item.updated` carries the full message text so far, while the flat
/// `agent_message_delta` form carries fragments; both become cumulative
/// [`NormalizedEvent::MessageDelta`] text.
#[derive(Debug, Default)]
pub struct CodexProtocol {
    fragments: String,
}

impl CodexProtocol {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_event(&mut self, event: CodexEvent) -> Decoded {
        match event {
            CodexEvent::ThreadStarted { thread_id } => {
                Decoded::one(NormalizedEvent::SessionStarted {
                    session_id: thread_id,
                })
            }
            CodexEvent::TurnStarted {} => Decoded::nothing(),
            CodexEvent::TurnCompleted { usage } => Decoded::one(NormalizedEvent::TurnCompleted {
                usage: usage.map(Usage::from),
            }),
            CodexEvent::TurnFailed { error } => Decoded::one(NormalizedEvent::Error {
                message: error.message,
            }),
            CodexEvent::Error { message } => Decoded::one(NormalizedEvent::Error { message }),
            CodexEvent::ItemStarted { item } => self.decode_item(Phase::Started, item),
            CodexEvent::ItemUpdated { item } => self.decode_item(Phase::Updated, item),
            CodexEvent::ItemCompleted { item } => self.decode_item(Phase::Completed, item),
            CodexEvent::AgentMessage { text } => {
                self.fragments.clear();
                Decoded::one(NormalizedEvent::MessageComplete { text })
            }
            CodexEvent::AgentMessageDelta { delta } => {
                self.fragments.push_str(&delta);
                Decoded::one(NormalizedEvent::MessageDelta {
                    text: self.fragments.clone(),
                })
            }
            CodexEvent::Unknown => Decoded::Unrecognized,
        }
    }

    fn decode_item(&mut self, phase: Phase, item: CodexItem) -> Decoded {
        let id = item.id;
        match item.details {
            CodexItemDetails::AgentMessage { text } => match phase {
                Phase::Completed => {
                    self.fragments.clear();
                    Decoded::one(NormalizedEvent::MessageComplete { text })
                }
                Phase::Started | Phase::Updated if text.is_empty() => Decoded::nothing(),
                Phase::Started | Phase::Updated => {
                    Decoded::one(NormalizedEvent::MessageDelta { text })
                }
            },
            CodexItemDetails::CommandExecution {
                command,
                aggregated_output,
                exit_code,
                status,
            } => {
                let call = InvocationCall {
                    id,
                    kind: InvocationKind::Command,
                    name: "shell".to_string(),
                    input: Value::String(command),
                };
                let is_error = status == "failed" || exit_code.is_some_and(|code| code != 0);
                let output = (!aggregated_output.is_empty()).then_some(aggregated_output);
                invocation_event(phase, call, output, exit_code, is_error)
            }
            CodexItemDetails::McpToolCall {
                server,
                tool,
                arguments,
                result,
                error,
                status,
            } => {
                let call = InvocationCall {
                    id,
                    kind: InvocationKind::Tool,
                    name: format!("{server}.{tool}"),
                    input: arguments,
                };
                let is_error = status == "failed" || error.is_some();
                let output = error.map(|e| e.message).or_else(|| output_text(&result));
                invocation_event(phase, call, output, None, is_error)
            }
            CodexItemDetails::FileChange { changes, status } => {
                let call = InvocationCall {
                    id,
                    kind: InvocationKind::Tool,
                    name: "apply_patch".to_string(),
                    input: changes,
                };
                invocation_event(phase, call, None, None, status == "failed")
            }
            CodexItemDetails::WebSearch { query } => {
                let call = InvocationCall {
                    id,
                    kind: InvocationKind::Tool,
                    name: "web_search".to_string(),
                    input: Value::String(query),
                };
                invocation_event(phase, call, None, None, false)
            }
            CodexItemDetails::Reasoning { .. }
            | CodexItemDetails::TodoList { .. }
            | CodexItemDetails::Error { .. } => Decoded::nothing(),
            CodexItemDetails::Unknown => Decoded::Unrecognized,
        }
    }
}

fn invocation_event(
    phase: Phase,
    call: InvocationCall,
    output: Option<String>,
    exit_code: Option<i32>,
    is_error: bool,
) -> Decoded {
    let event = match phase {
        Phase::Started => NormalizedEvent::InvocationStarted(call),
        Phase::Updated => NormalizedEvent::InvocationUpdated(call),
        Phase::Completed => NormalizedEvent::InvocationFinished(InvocationResult {
            id: call.id.clone(),
            call: Some(call),
            output,
            exit_code,
            is_error,
        }),
    };
    Decoded::one(event)
}

impl Protocol for CodexProtocol {
    fn decode(&mut self, value: &Value) -> Decoded {
        match CodexEvent::deserialize(value) {
            Ok(event) => self.decode_event(event),
            Err(e) => {
                tracing::debug!(error = %e, "Codex event did not match its schema");
                Decoded::Unrecognized
            }
        }
    }
}

/// Adapter for the Codex CLI.
#[derive(Debug, Clone)]
pub struct CodexAgent {
    setup: AdapterSetup,
}

impl CodexAgent {
    /// Create an adapter that looks for `codex` on `$PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            setup: AdapterSetup::defaults(DEFAULT_BINARY, NOISE),
        }
    }

    /// Create an adapter with a custom binary path.
    #[must_use]
    pub fn with_binary(path: impl Into<String>) -> Self {
        let mut agent = Self::new();
        agent.setup.binary = path.into();
        agent
    }

    /// Create an adapter from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` for a bad stderr pattern.
    pub fn from_config(config: &AgentConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            setup: AdapterSetup::from_config(config, DEFAULT_BINARY, NOISE)?,
        })
    }
}

impl Default for CodexAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for CodexAgent {
    fn name(&self) -> &str {
        "codex"
    }

    fn command(&self, request: &TaskRequest) -> CommandSpec {
        if let Some(session) = &request.resume {
            tracing::warn!(%session, "Codex exec cannot resume sessions, starting fresh");
        }
        let spec = CommandSpec::new(&self.setup.binary)
            .args(["exec", "--json"])
            .arg(&request.task);
        self.setup.finish(spec, request)
    }

    fn protocol(&self) -> Box<dyn Protocol> {
        Box::new(CodexProtocol::new())
    }

    fn stderr_filter(&self) -> NoiseFilter {
        self.setup.filter.clone()
    }
}

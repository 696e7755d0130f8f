//! Claude Code adapter.
//!
//! Runs `claude -p --output-format stream-json --verbose <task>` and decodes
//! the stream-json events.
//!
//! An `assistant` line may carry several content blocks. It decodes to one
//! `MessageComplete` holding the joined text blocks, followed by one
//! `InvocationStarted` per `tool_use` block. This is the only dialect where a
//! single line can yield more than one event.
//!
//! Zero-event lines: `system` lines other than `init`, `assistant` lines with
//! only thinking blocks, `user` lines without tool results, and `stream_event`
//! lines other than text deltas.

use serde::Deserialize;
use serde_json::Value;

use super::{output_text, AdapterSetup, Agent, TaskRequest};
use crate::cli::{
    CommandSpec, Decoded, InvocationCall, InvocationKind, InvocationResult, NoiseFilter,
    NormalizedEvent, Protocol, Usage,
};
use crate::config::{AgentConfig, ConfigError};

const DEFAULT_BINARY: &str = "claude";

/// Token usage from the final `result` event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClaudeUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Message content: plain text or structured blocks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Blocks(Vec::new())
    }
}

/// A content block within a message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Other,
}

/// An `assistant` or `user` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClaudeMessage {
    #[serde(default)]
    pub content: MessageContent,
}

/// Streaming delta payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

/// Raw API stream event wrapped in `stream_event` lines.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {},
    ContentBlockDelta { delta: ContentDelta },
    #[serde(other)]
    Other,
}

/// Events emitted by Claude Code in stream-json format.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeEvent {
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    Assistant {
        message: ClaudeMessage,
    },
    User {
        message: ClaudeMessage,
    },
    StreamEvent {
        event: StreamEvent,
    },
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        usage: Option<ClaudeUsage>,
        #[serde(default)]
        total_cost_usd: Option<f64>,
    },
    #[serde(other)]
    Unknown,
}

/// Decoder for Claude Code stream-json.
///
/// Text deltas are fragments; they are accumulated per message, reset on
/// `message_start`, and reported as cumulative text.
#[derive(Debug, Default)]
pub struct ClaudeProtocol {
    partial: String,
}

impl ClaudeProtocol {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_event(&mut self, event: ClaudeEvent) -> Decoded {
        match event {
            ClaudeEvent::System {
                subtype,
                session_id,
            } => match (subtype.as_deref(), session_id) {
                (Some("init"), Some(session_id)) => {
                    Decoded::one(NormalizedEvent::SessionStarted { session_id })
                }
                _ => Decoded::nothing(),
            },
            ClaudeEvent::Assistant { message } => Self::decode_assistant(message.content),
            ClaudeEvent::User { message } => Self::decode_user(message.content),
            ClaudeEvent::StreamEvent { event } => match event {
                StreamEvent::MessageStart {} => {
                    self.partial.clear();
                    Decoded::nothing()
                }
                StreamEvent::ContentBlockDelta {
                    delta: ContentDelta::TextDelta { text },
                } => {
                    self.partial.push_str(&text);
                    Decoded::one(NormalizedEvent::MessageDelta {
                        text: self.partial.clone(),
                    })
                }
                StreamEvent::ContentBlockDelta { .. } | StreamEvent::Other => Decoded::nothing(),
            },
            ClaudeEvent::Result {
                subtype,
                is_error,
                result,
                usage,
                total_cost_usd,
            } => {
                if is_error {
                    let message = result
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| format!("claude run failed: {subtype}"));
                    return Decoded::one(NormalizedEvent::Error { message });
                }
                let usage = usage.map(|u| Usage {
                    input_tokens: u.input_tokens,
                    cached_input_tokens: u.cache_read_input_tokens,
                    output_tokens: u.output_tokens,
                    cost_usd: total_cost_usd,
                });
                Decoded::one(NormalizedEvent::TurnCompleted { usage })
            }
            ClaudeEvent::Unknown => Decoded::Unrecognized,
        }
    }

    fn decode_assistant(content: MessageContent) -> Decoded {
        let blocks = match content {
            MessageContent::Text(text) => {
                return Decoded::one(NormalizedEvent::MessageComplete { text });
            }
            MessageContent::Blocks(blocks) => blocks,
        };

        let mut texts = Vec::new();
        let mut calls = Vec::new();
        for block in blocks {
            match block {
                ContentBlock::Text { text } => texts.push(text),
                ContentBlock::ToolUse { id, name, input } => {
                    calls.push(NormalizedEvent::InvocationStarted(InvocationCall {
                        id,
                        kind: InvocationKind::Tool,
                        name,
                        input,
                    }));
                }
                ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
            }
        }

        let mut events = Vec::with_capacity(calls.len() + 1);
        if !texts.is_empty() {
            events.push(NormalizedEvent::MessageComplete {
                text: texts.join("\n"),
            });
        }
        events.extend(calls);
        Decoded::Events(events)
    }

    fn decode_user(content: MessageContent) -> Decoded {
        let MessageContent::Blocks(blocks) = content else {
            return Decoded::nothing();
        };
        let events = blocks
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(NormalizedEvent::InvocationFinished(InvocationResult {
                    id: tool_use_id,
                    call: None,
                    output: output_text(&content),
                    exit_code: None,
                    is_error: is_error.unwrap_or(false),
                })),
                _ => None,
            })
            .collect();
        Decoded::Events(events)
    }
}

impl Protocol for ClaudeProtocol {
    fn decode(&mut self, value: &Value) -> Decoded {
        match ClaudeEvent::deserialize(value) {
            Ok(event) => self.decode_event(event),
            Err(e) => {
                tracing::debug!(error = %e, "Claude event did not match its schema");
                Decoded::Unrecognized
            }
        }
    }
}

/// Adapter for Claude Code.
#[derive(Debug, Clone)]
pub struct ClaudeAgent {
    setup: AdapterSetup,
}

impl ClaudeAgent {
    /// Create an adapter that looks for `claude` on `$PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            setup: AdapterSetup::defaults(DEFAULT_BINARY, &[]),
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
            setup: AdapterSetup::from_config(config, DEFAULT_BINARY, &[])?,
        })
    }
}

impl Default for ClaudeAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for ClaudeAgent {
    fn name(&self) -> &str {
        "claude"
    }

    fn command(&self, request: &TaskRequest) -> CommandSpec {
        let spec = CommandSpec::new(&self.setup.binary)
            .args(["-p", "--output-format", "stream-json", "--verbose"])
            .arg(&request.task)
            .opt("--resume", request.resume.as_deref());
        self.setup.finish(spec, request)
    }

    fn protocol(&self) -> Box<dyn Protocol> {
        Box::new(ClaudeProtocol::new())
    }

    fn stderr_filter(&self) -> NoiseFilter {
        self.setup.filter.clone()
    }
}

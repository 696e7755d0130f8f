//! Gemini CLI adapter.
//!
//! Runs `gemini --output-format stream-json --prompt <task>`.
//!
//! Zero-event lines: `message` lines with the `user` role (the echoed prompt)
//! and `error` lines with `warning` severity, which are logged instead.

use serde::Deserialize;
use serde_json::Value;

use super::{AdapterSetup, Agent, TaskRequest};
use crate::cli::{
    CommandSpec, Decoded, InvocationCall, InvocationKind, InvocationResult, NoiseFilter,
    NormalizedEvent, Protocol, Usage,
};
use crate::config::{AgentConfig, ConfigError};

const DEFAULT_BINARY: &str = "gemini";

const NOISE: &[&str] = &["^Loaded cached credentials", "^Data collection is disabled"];

/// Error payload on `tool_result` and `result` lines.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeminiError {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    pub message: String,
}

/// Aggregated statistics on the final `result` line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeminiStats {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cached: u64,
}

/// Events emitted by `gemini --output-format stream-json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeminiEvent {
    Init {
        session_id: String,
        #[serde(default)]
        model: Option<String>,
    },
    Message {
        role: String,
        content: String,
        #[serde(default)]
        delta: bool,
    },
    ToolUse {
        tool_name: String,
        tool_id: String,
        #[serde(default)]
        parameters: Value,
    },
    ToolResult {
        tool_id: String,
        status: String,
        #[serde(default)]
        output: Option<String>,
        #[serde(default)]
        error: Option<GeminiError>,
    },
    Error {
        #[serde(default)]
        severity: Option<String>,
        message: String,
    },
    Result {
        status: String,
        #[serde(default)]
        error: Option<GeminiError>,
        #[serde(default)]
        stats: Option<GeminiStats>,
    },
    #[serde(other)]
    Unknown,
}

/// Decoder for Gemini stream-json.
///
/// Assistant messages flagged `delta` are fragments. They are accumulated
/// until the next tool call and reported as cumulative text.
#[derive(Debug, Default)]
pub struct GeminiProtocol {
    partial: String,
}

impl GeminiProtocol {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_event(&mut self, event: GeminiEvent) -> Decoded {
        match event {
            GeminiEvent::Init { session_id, model } => {
                tracing::debug!(%session_id, model = ?model, "Gemini session initialized");
                Decoded::one(NormalizedEvent::SessionStarted { session_id })
            }
            GeminiEvent::Message {
                role,
                content,
                delta,
            } => {
                if role != "assistant" {
                    return Decoded::nothing();
                }
                if delta {
                    self.partial.push_str(&content);
                    Decoded::one(NormalizedEvent::MessageDelta {
                        text: self.partial.clone(),
                    })
                } else {
                    self.partial.clear();
                    Decoded::one(NormalizedEvent::MessageComplete { text: content })
                }
            }
            GeminiEvent::ToolUse {
                tool_name,
                tool_id,
                parameters,
            } => {
                self.partial.clear();
                Decoded::one(NormalizedEvent::InvocationStarted(InvocationCall {
                    id: tool_id,
                    kind: InvocationKind::Tool,
                    name: tool_name,
                    input: parameters,
                }))
            }
            GeminiEvent::ToolResult {
                tool_id,
                status,
                output,
                error,
            } => Decoded::one(NormalizedEvent::InvocationFinished(InvocationResult {
                id: tool_id,
                call: None,
                output: error.map(|e| e.message).or(output),
                exit_code: None,
                is_error: status == "error",
            })),
            GeminiEvent::Error { severity, message } => {
                if severity.as_deref() == Some("warning") {
                    tracing::warn!(%message, "Gemini warning");
                    return Decoded::nothing();
                }
                Decoded::one(NormalizedEvent::Error { message })
            }
            GeminiEvent::Result {
                status,
                error,
                stats,
            } => {
                if status == "error" {
                    let message = error.map_or_else(
                        || "gemini run failed".to_string(),
                        |e| e.message,
                    );
                    return Decoded::one(NormalizedEvent::Error { message });
                }
                let usage = stats.map(|s| Usage {
                    input_tokens: s.input_tokens,
                    cached_input_tokens: s.cached,
                    output_tokens: s.output_tokens,
                    cost_usd: None,
                });
                Decoded::one(NormalizedEvent::TurnCompleted { usage })
            }
            GeminiEvent::Unknown => Decoded::Unrecognized,
        }
    }
}

impl Protocol for GeminiProtocol {
    fn decode(&mut self, value: &Value) -> Decoded {
        match GeminiEvent::deserialize(value) {
            Ok(event) => self.decode_event(event),
            Err(e) => {
                tracing::debug!(error = %e, "Gemini event did not match its schema");
                Decoded::Unrecognized
            }
        }
    }
}

/// Adapter for the Gemini CLI.
#[derive(Debug, Clone)]
pub struct GeminiAgent {
    setup: AdapterSetup,
}

impl GeminiAgent {
    /// Create an adapter that looks for `gemini` on `$PATH`.
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

impl Default for GeminiAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for GeminiAgent {
    fn name(&self) -> &str {
        "gemini"
    }

    fn command(&self, request: &TaskRequest) -> CommandSpec {
        let spec = CommandSpec::new(&self.setup.binary)
            .args(["--output-format", "stream-json", "--prompt"])
            .arg(&request.task)
            .opt("--resume", request.resume.as_deref());
        self.setup.finish(spec, request)
    }

    fn protocol(&self) -> Box<dyn Protocol> {
        Box::new(GeminiProtocol::new())
    }

    fn stderr_filter(&self) -> NoiseFilter {
        self.setup.filter.clone()
    }
}

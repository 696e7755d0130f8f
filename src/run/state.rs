//! Mutable summary of an agent run.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cli::{InvocationCall, InvocationKind, InvocationResult, NormalizedEvent, Usage};

/// Default cap on retained invocation records.
pub const DEFAULT_MAX_INVOCATIONS: usize = 80;

/// Default cap on retained stderr lines.
pub const DEFAULT_STDERR_TAIL_LINES: usize = 20;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Done,
    Error,
    Aborted,
}

impl RunStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Memory bounds for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub max_invocations: usize,
    pub stderr_tail_lines: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_invocations: DEFAULT_MAX_INVOCATIONS,
            stderr_tail_lines: DEFAULT_STDERR_TAIL_LINES,
        }
    }
}

/// A tool or command invocation observed during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub id: String,
    pub kind: InvocationKind,
    pub name: String,
    pub input: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub is_error: Option<bool>,
    pub output: Option<String>,
}

impl Invocation {
    fn open(call: InvocationCall) -> Self {
        Self {
            id: call.id,
            kind: call.kind,
            name: call.name,
            input: call.input,
            started_at: Utc::now(),
            ended_at: None,
            exit_code: None,
            is_error: None,
            output: None,
        }
    }

    /// Returns true while no result has been recorded.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    fn close(&mut self, result: InvocationResult) {
        self.ended_at = Some(Utc::now());
        self.exit_code = result.exit_code;
        self.is_error = Some(result.is_error);
        self.output = result.output;
    }
}

/// Snapshot-able state of one agent run.
///
/// Owned by the coordinator for the lifetime of the run. Callers only ever
/// see clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub agent: String,
    pub status: RunStatus,
    pub session_id: Option<String>,
    pub transcript: String,
    pub invocations: VecDeque<Invocation>,
    pub stderr_tail: VecDeque<String>,
    /// Text of the most recent raw events.
    pub unparsed_tail: VecDeque<String>,
    pub error: Option<String>,
    pub usage: Option<Usage>,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    limits: RunLimits,
}

impl RunState {
    /// Create the state of a run that is starting now.
    #[must_use]
    pub fn new(agent: impl Into<String>, limits: RunLimits) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            agent: agent.into(),
            status: RunStatus::Running,
            session_id: None,
            transcript: String::new(),
            invocations: VecDeque::new(),
            stderr_tail: VecDeque::new(),
            unparsed_tail: VecDeque::new(),
            error: None,
            usage: None,
            exit_code: None,
            exit_signal: None,
            started_at: Utc::now(),
            ended_at: None,
            limits,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Look up an invocation by id.
    #[must_use]
    pub fn invocation(&self, id: &str) -> Option<&Invocation> {
        self.invocations.iter().find(|i| i.id == id)
    }

    /// Apply a batch of events in order.
    ///
    /// Returns true if any of them changed the state.
    pub fn apply_all(&mut self, events: impl IntoIterator<Item = NormalizedEvent>) -> bool {
        let mut changed = false;
        for event in events {
            changed |= self.apply(event);
        }
        changed
    }

    /// Apply a single event.
    ///
    /// Returns true if the event changed the state.
    pub fn apply(&mut self, event: NormalizedEvent) -> bool {
        match event {
            NormalizedEvent::SessionStarted { session_id } => {
                if self.session_id.is_some() || session_id.is_empty() {
                    return false;
                }
                tracing::debug!(run_id = %self.run_id, %session_id, "Session started");
                self.session_id = Some(session_id);
                true
            }
            NormalizedEvent::MessageDelta { text } | NormalizedEvent::MessageComplete { text } => {
                if self.transcript == text {
                    return false;
                }
                self.transcript = text;
                true
            }
            NormalizedEvent::InvocationStarted(call) | NormalizedEvent::InvocationUpdated(call) => {
                self.upsert_invocation(call);
                true
            }
            NormalizedEvent::InvocationFinished(result) => self.finish_invocation(result),
            NormalizedEvent::TurnCompleted { usage } => match usage {
                Some(usage) => {
                    self.usage = Some(usage);
                    true
                }
                None => false,
            },
            NormalizedEvent::Error { message } => self.record_error(message),
            NormalizedEvent::Raw { line } => {
                tracing::warn!(run_id = %self.run_id, line = %line, "Unrecognized agent output");
                push_bounded(&mut self.unparsed_tail, line, self.limits.stderr_tail_lines);
                true
            }
        }
    }

    /// Record a stderr line, evicting the oldest beyond the cap.
    pub fn push_stderr(&mut self, line: String) {
        push_bounded(&mut self.stderr_tail, line, self.limits.stderr_tail_lines);
    }

    /// Record the first fatal error of a live run.
    ///
    /// Ignored once an error is present or the run has ended.
    pub fn record_error(&mut self, message: impl Into<String>) -> bool {
        if self.error.is_some() || !self.is_running() {
            return false;
        }
        self.error = Some(message.into());
        true
    }

    /// Transition to `aborted`, discarding any captured error.
    ///
    /// Returns false if the run had already ended.
    pub fn abort(&mut self) -> bool {
        if !self.transition(RunStatus::Aborted) {
            return false;
        }
        self.error = None;
        true
    }

    /// Transition to `error` with the given message, unless a more specific
    /// stream error was already captured.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if self.error.is_none() {
            self.error = Some(message.into());
        }
        self.transition(RunStatus::Error)
    }

    /// Settle the run from the process's exit.
    ///
    /// An aborted run stays aborted. A non-zero exit or a death by signal is
    /// an error; anything else is done.
    pub fn finish_with_exit(&mut self, exit_code: Option<i32>, exit_signal: Option<i32>) -> bool {
        self.exit_code = exit_code;
        self.exit_signal = exit_signal;

        if self.status.is_terminal() {
            return false;
        }

        match (exit_code, exit_signal) {
            (Some(0), _) => self.transition(RunStatus::Done),
            (Some(code), _) => self.fail(format!("process exited with code {code}")),
            (None, Some(signal)) => self.fail(format!("process terminated by signal {signal}")),
            (None, None) => self.fail("process exited with unknown status"),
        }
    }

    /// Perform the single terminal transition.
    fn transition(&mut self, status: RunStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        tracing::debug!(run_id = %self.run_id, from = %self.status, to = %status, "State transition");
        self.status = status;
        self.ended_at = Some(Utc::now());
        true
    }

    fn upsert_invocation(&mut self, call: InvocationCall) {
        if let Some(existing) = self.invocations.iter_mut().find(|i| i.id == call.id) {
            if existing.is_open() {
                existing.name = call.name;
                existing.input = call.input;
            }
            return;
        }
        let cap = self.limits.max_invocations;
        push_bounded(&mut self.invocations, Invocation::open(call), cap);
    }

    fn finish_invocation(&mut self, result: InvocationResult) -> bool {
        if let Some(existing) = self.invocations.iter_mut().find(|i| i.id == result.id) {
            if !existing.is_open() {
                return false;
            }
            existing.close(result);
            return true;
        }

        // Start never observed (or already evicted): keep a closed record.
        let call = result.call.clone().unwrap_or_else(|| InvocationCall {
            id: result.id.clone(),
            kind: InvocationKind::Tool,
            name: "unknown".to_string(),
            input: serde_json::Value::Null,
        });
        let mut invocation = Invocation::open(call);
        invocation.close(result);
        let cap = self.limits.max_invocations;
        push_bounded(&mut self.invocations, invocation, cap);
        true
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, item: T, cap: usize) {
    if cap == 0 {
        return;
    }
    while ring.len() >= cap {
        ring.pop_front();
    }
    ring.push_back(item);
}

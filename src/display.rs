//! Colored CLI display for run progress.
//!
//! Progress arrives as whole [`RunState`] snapshots. [`ProgressPrinter`]
//! remembers what it already showed and prints only what is new.

use std::collections::HashSet;
use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::cli::{InvocationKind, Usage};
use crate::run::{Invocation, RunState, RunStatus};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Truncate a string to a maximum number of characters, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// Format invocation input for display, truncating long values.
#[must_use]
pub fn format_input(input: &serde_json::Value, raw_mode: bool) -> String {
    match input {
        serde_json::Value::Object(map) => {
            let pairs: Vec<String> = map
                .iter()
                .map(|(k, v)| {
                    let value_str = match v {
                        serde_json::Value::String(s) => truncate(s, 50, raw_mode),
                        other => truncate(&other.to_string(), 50, raw_mode),
                    };
                    format!("{k}={value_str}")
                })
                .collect();
            pairs.join(", ")
        }
        serde_json::Value::String(s) => truncate(s, DEFAULT_MAX_LEN, raw_mode),
        other => truncate(&other.to_string(), DEFAULT_MAX_LEN, raw_mode),
    }
}

/// Format token usage as a short summary.
#[must_use]
pub fn format_usage(usage: &Usage) -> String {
    let mut out = format!(
        "tokens in={} (cached {}) out={}",
        usage.input_tokens, usage.cached_input_tokens, usage.output_tokens
    );
    if let Some(cost) = usage.cost_usd {
        out.push_str(&format!(" cost=${cost:.4}"));
    }
    out
}

/// Describe how an invocation ended.
#[must_use]
pub fn format_outcome(invocation: &Invocation) -> String {
    let verdict = match invocation.is_error {
        Some(true) => "failed",
        Some(false) => "ok",
        None => "running",
    };
    match invocation.exit_code {
        Some(code) => format!("{verdict} (exit {code})"),
        None => verdict.to_string(),
    }
}

fn kind_tag(kind: InvocationKind) -> &'static str {
    match kind {
        InvocationKind::Tool => "[TOOL]",
        InvocationKind::Command => "[CMD]",
    }
}

/// Prints the parts of each snapshot that have not been shown yet.
#[derive(Debug, Default)]
pub struct ProgressPrinter {
    raw_mode: bool,
    session_shown: bool,
    started: HashSet<String>,
    finished: HashSet<String>,
}

impl ProgressPrinter {
    #[must_use]
    pub fn new(raw_mode: bool) -> Self {
        Self {
            raw_mode,
            ..Default::default()
        }
    }

    /// Print whatever changed since the previous snapshot.
    pub fn update(&mut self, state: &RunState) {
        if !self.session_shown {
            if let Some(session_id) = &state.session_id {
                print_session_start(&state.agent, session_id, self.raw_mode);
                self.session_shown = true;
            }
        }
        for invocation in &state.invocations {
            if self.started.insert(invocation.id.clone()) {
                print_invocation_start(invocation, self.raw_mode);
            }
            if !invocation.is_open() && self.finished.insert(invocation.id.clone()) {
                print_invocation_end(invocation, self.raw_mode);
            }
        }
    }
}

/// Print session start information.
pub fn print_session_start(agent: &str, session_id: &str, raw_mode: bool) {
    println!(
        "{} {} agent={}, session={}",
        timestamp().dimmed(),
        "[SESSION]".blue().bold(),
        agent.cyan(),
        truncate(session_id, 40, raw_mode).dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print an invocation as it starts.
pub fn print_invocation_start(invocation: &Invocation, raw_mode: bool) {
    println!(
        "{} {} ({})",
        kind_tag(invocation.kind).cyan().bold(),
        invocation.name.bold(),
        format_input(&invocation.input, raw_mode).dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print an invocation result.
pub fn print_invocation_end(invocation: &Invocation, raw_mode: bool) {
    let output = invocation
        .output
        .as_deref()
        .map(|o| truncate(o.trim(), 150, raw_mode))
        .unwrap_or_default();
    let outcome = format_outcome(invocation);
    if invocation.is_error == Some(true) {
        println!(
            "{} {} {} {}",
            "[RESULT]".red().bold(),
            invocation.name.dimmed(),
            outcome.red(),
            output
        );
    } else {
        println!(
            "{} {} {} {}",
            "[RESULT]".green().bold(),
            invocation.name.dimmed(),
            outcome,
            output
        );
    }
    let _ = io::stdout().flush();
}

/// Print the final transcript and a one-line summary of the run.
pub fn print_summary(state: &RunState) {
    if !state.transcript.is_empty() {
        println!("{}", state.transcript);
    }

    let ts = timestamp();
    let elapsed = state
        .ended_at
        .map(|end| (end - state.started_at).num_milliseconds())
        .map_or(String::new(), |ms| format!(" in {:.1}s", ms as f64 / 1000.0));
    let usage = state
        .usage
        .as_ref()
        .map_or(String::new(), |u| format!(" {}", format_usage(u)));

    match state.status {
        RunStatus::Done => println!(
            "{} {} {} completed{}{}",
            ts.dimmed(),
            "[DONE]".green().bold(),
            state.agent,
            elapsed,
            usage.dimmed()
        ),
        RunStatus::Aborted => println!(
            "{} {} {} cancelled{}",
            ts.dimmed(),
            "[ABORTED]".yellow().bold(),
            state.agent,
            elapsed
        ),
        RunStatus::Error | RunStatus::Running => println!(
            "{} {} {} failed{}",
            ts.dimmed(),
            "[ERROR]".red().bold(),
            state.agent,
            elapsed
        ),
    }
    if let Some(error) = &state.error {
        print_error(error);
    }
    if state.status == RunStatus::Error {
        for line in &state.stderr_tail {
            println!("  {}", line.dimmed());
        }
    }
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    println!("{} {}", "[ERROR]".red().bold(), message);
    let _ = io::stdout().flush();
}

//! Run coordinator for external agent processes.
//!
//! This module ties the pieces together: it spawns the agent, feeds stdout
//! through the stream parser and stderr into the tail, applies events to the
//! [`RunState`], throttles progress updates, and handles cancellation with a
//! two-phase termination (SIGTERM, then SIGKILL after a grace window).
//!
//! A run always ends in exactly one terminal state. Expected failures (spawn
//! errors, non-zero exits, agent-reported errors, cancellation) are encoded in
//! that state; `Err` is reserved for internal faults.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, ChildStdout};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::agents::{Agent, TaskRequest};
use crate::cli::{exit_details, AgentProcess, StderrLines, StreamParser};
use crate::run::{ProgressEmitter, ProgressFn, RunLimits, RunState, DEFAULT_THROTTLE_INTERVAL};

/// Default time between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Default time to keep reading pipes after the process has exited.
///
/// Grandchildren may inherit the pipes and hold them open indefinitely.
pub const DEFAULT_PIPE_DRAIN: Duration = Duration::from_secs(2);

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Error type for internal coordinator faults.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    /// The spawned process had no stdout pipe.
    #[error("Agent stdout not captured")]
    NoStdout,
    /// The spawned process had no stderr pipe.
    #[error("Agent stderr not captured")]
    NoStderr,
}

/// Timing and memory settings for runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub throttle_interval: Duration,
    pub kill_grace: Duration,
    pub pipe_drain: Duration,
    pub limits: RunLimits,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            kill_grace: DEFAULT_KILL_GRACE,
            pipe_drain: DEFAULT_PIPE_DRAIN,
            limits: RunLimits::default(),
        }
    }
}

/// Options for a single run.
pub struct RunOptions {
    request: TaskRequest,
    cancel: Option<CancellationToken>,
    on_update: Option<ProgressFn>,
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("request", &self.request)
            .field("cancellable", &self.cancel.is_some())
            .field("has_progress", &self.on_update.is_some())
            .finish()
    }
}

impl RunOptions {
    /// Create options for the given task.
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self::from_request(TaskRequest::new(task))
    }

    #[must_use]
    pub fn from_request(request: TaskRequest) -> Self {
        Self {
            request,
            cancel: None,
            on_update: None,
        }
    }

    /// Set the working directory for the agent process.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.request.working_dir = Some(dir.into());
        self
    }

    /// Override the agent's model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.request.model = Some(model.into());
        self
    }

    /// Resume an existing agent session.
    #[must_use]
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.request.resume = Some(session_id.into());
        self
    }

    /// Append an extra flag to the command line.
    #[must_use]
    pub fn extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.request.extra_args.push(arg.into());
        self
    }

    /// Set a cancellation token. It may be shared with other work.
    #[must_use]
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Receive throttled snapshots of the run state.
    ///
    /// Never called after [`Coordinator::run`] returns; always called at least
    /// once with the terminal state.
    #[must_use]
    pub fn on_update(mut self, f: impl FnMut(RunState) + Send + 'static) -> Self {
        self.on_update = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn request(&self) -> &TaskRequest {
        &self.request
    }
}

/// Drives agent processes from spawn to terminal state.
#[derive(Clone)]
pub struct Coordinator {
    agent: Arc<dyn Agent>,
    settings: RunSettings,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("agent", &self.agent.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Coordinator {
    #[must_use]
    pub fn new(agent: impl Agent + 'static) -> Self {
        Self::from_boxed(Box::new(agent))
    }

    #[must_use]
    pub fn from_boxed(agent: Box<dyn Agent>) -> Self {
        Self {
            agent: Arc::from(agent),
            settings: RunSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn agent(&self) -> &dyn Agent {
        self.agent.as_ref()
    }

    #[must_use]
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Run the agent on a task and return its terminal state.
    ///
    /// # Errors
    ///
    /// Returns `RunError` only for internal faults. Spawn failures, agent
    /// errors, non-zero exits and cancellation are reported through
    /// [`RunState::status`] and [`RunState::error`].
    pub async fn run(&self, options: RunOptions) -> Result<RunState, RunError> {
        let RunOptions {
            request,
            cancel,
            on_update,
        } = options;

        let mut state = RunState::new(self.agent.name(), self.settings.limits);
        let mut emitter = ProgressEmitter::new(self.settings.throttle_interval, on_update);

        if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            tracing::info!(
                run_id = %state.run_id,
                agent = %state.agent,
                "Run cancelled before spawn"
            );
            state.abort();
            emitter.force(&state);
            return Ok(state);
        }

        let spec = self.agent.command(&request);
        tracing::info!(
            run_id = %state.run_id,
            agent = %state.agent,
            command = %spec.display(),
            cwd = ?spec.get_working_dir(),
            "Spawning agent"
        );

        let mut process = match AgentProcess::spawn(&spec) {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!(run_id = %state.run_id, error = %e, "Agent failed to spawn");
                state.fail(e.to_string());
                emitter.force(&state);
                return Ok(state);
            }
        };
        let stdout = process.take_stdout().ok_or(RunError::NoStdout)?;
        let stderr = process.take_stderr().ok_or(RunError::NoStderr)?;
        tracing::debug!(run_id = %state.run_id, pid = ?process.id(), "Agent spawned");

        emitter.force(&state);

        let exit = self
            .drive(
                &mut process,
                Pipes { stdout, stderr },
                cancel,
                &mut state,
                &mut emitter,
            )
            .await;

        match exit {
            Ok(status) => {
                let (code, signal) = exit_details(status);
                state.finish_with_exit(code, signal);
            }
            Err(e) => {
                state.fail(format!("failed to wait for agent process: {e}"));
            }
        }

        tracing::info!(
            run_id = %state.run_id,
            status = %state.status,
            exit_code = ?state.exit_code,
            exit_signal = ?state.exit_signal,
            invocations = state.invocations.len(),
            error = ?state.error,
            "Agent run finished"
        );
        emitter.force(&state);
        Ok(state)
    }

    /// Pump the process until it has exited and its pipes are drained.
    ///
    /// Returns the exit status. Parser and stderr remainders are flushed into
    /// `state` before returning; the terminal transition is left to the caller.
    async fn drive(
        &self,
        process: &mut AgentProcess,
        pipes: Pipes,
        cancel: Option<CancellationToken>,
        state: &mut RunState,
        emitter: &mut ProgressEmitter,
    ) -> std::io::Result<ExitStatus> {
        let Pipes {
            mut stdout,
            mut stderr,
        } = pipes;
        let mut parser = StreamParser::new(self.agent.protocol());
        let mut stderr_lines = StderrLines::new(self.agent.stderr_filter());
        let mut out_buf = vec![0u8; READ_BUFFER_SIZE];
        let mut err_buf = vec![0u8; READ_BUFFER_SIZE];

        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut exit: Option<std::io::Result<ExitStatus>> = None;
        let mut kill_at: Option<Instant> = None;
        let mut drain_until: Option<Instant> = None;

        let mut listening = cancel.is_some();
        let cancelled = async {
            match &cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(cancelled);

        while exit.is_none() || stdout_open || stderr_open {
            tokio::select! {
                read = stdout.read(&mut out_buf), if stdout_open => match read {
                    Ok(0) => stdout_open = false,
                    Ok(n) => {
                        if state.apply_all(parser.feed(&out_buf[..n])) {
                            emitter.notify(state);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(run_id = %state.run_id, error = %e, "Failed to read agent stdout");
                        stdout_open = false;
                    }
                },
                read = stderr.read(&mut err_buf), if stderr_open => match read {
                    Ok(0) => stderr_open = false,
                    Ok(n) => {
                        let lines = stderr_lines.push(&err_buf[..n]);
                        if !lines.is_empty() {
                            for line in lines {
                                state.push_stderr(line);
                            }
                            emitter.notify(state);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(run_id = %state.run_id, error = %e, "Failed to read agent stderr");
                        stderr_open = false;
                    }
                },
                () = &mut cancelled, if listening && exit.is_none() => {
                    listening = false;
                    if state.abort() {
                        tracing::info!(run_id = %state.run_id, pid = ?process.id(), "Run cancelled, terminating agent");
                        emitter.force(state);
                        if let Err(e) = process.terminate() {
                            tracing::warn!(run_id = %state.run_id, error = %e, "Failed to signal agent");
                        }
                        kill_at = Some(Instant::now() + self.settings.kill_grace);
                    }
                },
                () = sleep_until_opt(kill_at), if exit.is_none() => {
                    kill_at = None;
                    tracing::warn!(
                        run_id = %state.run_id,
                        grace = ?self.settings.kill_grace,
                        "Agent still running after grace window, killing"
                    );
                    if let Err(e) = process.kill() {
                        tracing::warn!(run_id = %state.run_id, error = %e, "Failed to kill agent");
                    }
                },
                () = sleep_until_opt(emitter.deadline()) => emitter.fire(state),
                status = process.wait(), if exit.is_none() => {
                    tracing::debug!(run_id = %state.run_id, status = ?status, "Agent exited");
                    kill_at = None;
                    drain_until = Some(Instant::now() + self.settings.pipe_drain);
                    exit = Some(status);
                },
                () = sleep_until_opt(drain_until) => {
                    tracing::warn!(
                        run_id = %state.run_id,
                        stdout_open,
                        stderr_open,
                        "Agent pipes still open after exit, abandoning them"
                    );
                    drain_until = None;
                    stdout_open = false;
                    stderr_open = false;
                },
            }
        }

        let trailing = parser.flush();
        state.apply_all(trailing);
        if let Some(line) = stderr_lines.finish() {
            state.push_stderr(line);
        }

        exit.unwrap_or_else(|| Err(std::io::Error::other("agent exit status unavailable")))
    }
}

struct Pipes {
    stdout: ChildStdout,
    stderr: ChildStderr,
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

//! Agent process spawning and termination.
//!
//! [`CommandSpec`] describes the command line an adapter wants to run.
//! [`AgentProcess`] owns the spawned child and implements the two termination
//! phases used by kill escalation: a graceful request and a forceful kill.

use std::borrow::Cow;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The executable was not found on the search path.
    #[error("executable `{0}` not found")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("permission denied running `{0}`")]
    PermissionDenied(String),
    /// Other I/O error.
    #[error("failed to spawn `{program}`: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(program: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_string()),
            _ => Self::Io {
                program: program.to_string(),
                source: err,
            },
        }
    }
}

/// Builder for an agent command line.
///
/// Shape: `<program> <fixed flags> <task> [optional flags...]`. The working
/// directory is a spawn option, not an argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// Create a new spec for the given executable.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `flag value` when `value` is present.
    #[must_use]
    pub fn opt(self, flag: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.arg(flag).arg(value),
            None => self,
        }
    }

    /// Set the working directory for the process.
    #[must_use]
    pub fn working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn get_working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Render the command line with shell quoting, for logs.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| shell_escape::escape(Cow::Borrowed(s.as_str())).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A running agent process.
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
}

impl AgentProcess {
    /// Spawn the process described by `spec`.
    ///
    /// stdout and stderr are piped, stdin is closed: agents receive their
    /// task on the command line. The child is killed if the handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(spec: &CommandSpec) -> Result<Self, SpawnError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = spec.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(&spec.program, e))?;

        Ok(Self { child })
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit.
    ///
    /// Cancel safe, so it can sit in a `select!` loop.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Ask the process to exit.
    ///
    /// On Unix this sends SIGTERM and returns immediately. On other platforms
    /// there is no graceful signal, so the process is killed outright.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    pub fn terminate(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let Some(pid) = self.id() else {
                // Already reaped.
                return Ok(());
            };
            let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
            match kill(nix_pid, Signal::SIGTERM) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
                Err(errno) => Err(std::io::Error::from(errno)),
            }
        }

        #[cfg(not(unix))]
        {
            self.kill()
        }
    }

    /// Forcefully kill the process without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub fn kill(&mut self) -> std::io::Result<()> {
        match self.child.start_kill() {
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }
}

/// Exit code and terminating signal of an exited process.
#[must_use]
pub fn exit_details(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        (status.code(), status.signal())
    }

    #[cfg(not(unix))]
    {
        (status.code(), None)
    }
}

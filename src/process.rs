//! Bounded child processes.
//!
//! The completion gate and the lint relay are the only places that run
//! anything. Both go through [`run_bounded`], which owns the child for its
//! whole life: output is drained concurrently, the wait is bounded, and a
//! child that overruns its deadline is killed and reaped before returning.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::error::GateError;

/// How long to keep draining pipes after the child exited. A grandchild that
/// inherited the pipes can hold them open indefinitely.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// A program and its arguments, plus the text shown in messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    display: String,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let display = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            program,
            args,
            display,
        }
    }

    /// Run `command` through the platform shell.
    pub fn shell(command: &str) -> Self {
        let (program, flag) = if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        Self {
            program: program.to_string(),
            args: vec![flag.to_string(), command.to_string()],
            display: command.to_string(),
        }
    }

    pub fn display(&self) -> &str {
        &self.display
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed {
        success: bool,
        stdout: String,
        stderr: String,
    },
    /// Deadline passed; the child was killed and no output is kept.
    TimedOut,
}

impl ProcessOutcome {
    /// stdout followed by stderr, empty on timeout.
    pub fn combined_output(&self) -> String {
        match self {
            Self::Completed { stdout, stderr, .. } => format!("{}{}", stdout, stderr),
            Self::TimedOut => String::new(),
        }
    }
}

/// Run `spec` in `cwd`, waiting at most `timeout`.
pub async fn run_bounded(
    spec: &CommandSpec,
    cwd: &Path,
    timeout: Duration,
) -> Result<ProcessOutcome, GateError> {
    tracing::debug!(command = %spec.display, cwd = %cwd.display(), ?timeout, "Spawning");

    let mut command = tokio::process::Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so a timeout takes the test runner's workers down too.
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command
        .spawn()
        .map_err(|source| GateError::Spawn {
            command: spec.display.clone(),
            source,
        })?;

    let stdout = tokio::spawn(drain(child.stdout.take()));
    let stderr = tokio::spawn(drain(child.stderr.take()));

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            let status = status?;
            Ok(ProcessOutcome::Completed {
                success: status.success(),
                stdout: collect(stdout).await,
                stderr: collect(stderr).await,
            })
        }
        Err(_) => {
            tracing::warn!(command = %spec.display, ?timeout, "Command timed out, killing");
            #[cfg(unix)]
            kill_process_group(&child, &spec.display);
            if let Err(e) = child.kill().await {
                tracing::warn!(command = %spec.display, "Failed to kill timed-out child: {}", e);
            }
            stdout.abort();
            stderr.abort();
            Ok(ProcessOutcome::TimedOut)
        }
    }
}

/// SIGKILL every process in the child's group.
#[cfg(unix)]
fn kill_process_group(child: &tokio::process::Child, command: &str) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    #[allow(clippy::cast_possible_wrap)]
    let group = Pid::from_raw(pid as i32);
    if let Err(e) = killpg(group, Signal::SIGKILL) {
        tracing::warn!(command, pid, "Failed to kill process group: {}", e);
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            tracing::debug!("Pipe read ended early: {}", e);
        }
    }
    buf
}

async fn collect(task: JoinHandle<Vec<u8>>) -> String {
    match tokio::time::timeout(PIPE_DRAIN_GRACE, task).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            tracing::debug!("Pipe reader failed: {}", e);
            String::new()
        }
        Err(_) => {
            tracing::debug!("Pipe still open after exit, dropping output");
            String::new()
        }
    }
}

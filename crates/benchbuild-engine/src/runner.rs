//! Subprocess execution.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::CommandError;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    /// Create a new spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Builder method to append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Builder method to append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program to execute.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, without the program.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Full argument vector, program first.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Executes external commands.
///
/// Implement this trait to substitute the real engine, e.g. with
/// `testing::ScriptedRunner` in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and return captured stdout.
    async fn run(&self, spec: &CommandSpec) -> Result<String, CommandError>;

    /// Like [`run`](Self::run), but also stream output to the console
    /// while the command runs.
    async fn run_tee(&self, spec: &CommandSpec) -> Result<String, CommandError>;
}

/// [`CommandRunner`] backed by real subprocesses.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Deadline for a single command.
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// Create a runner without a deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill commands that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(spec.program());
        cmd.args(spec.arguments()).kill_on_drop(true);
        cmd
    }

    fn spawn_error(spec: &CommandSpec, source: std::io::Error) -> CommandError {
        error!(command = %spec, error = %source, "Failed to spawn command");
        CommandError::Spawn {
            argv: spec.argv(),
            source,
        }
    }

    fn timeout_error(&self, spec: &CommandSpec) -> CommandError {
        let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
        error!(command = %spec, secs, "Command timed out");
        CommandError::Timeout {
            argv: spec.argv(),
            secs,
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<String, CommandError> {
        debug!(command = %spec, "Running command");

        let mut cmd = Self::command(spec);
        cmd.stdin(Stdio::null());

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(result) => result,
                Err(_) => return Err(self.timeout_error(spec)),
            },
            None => cmd.output().await,
        }
        .map_err(|e| Self::spawn_error(spec, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let code = output.status.code().unwrap_or(-1);
        debug!(command = %spec, exit_code = code, "Command failed");
        Err(CommandError::Exit {
            argv: spec.argv(),
            code,
            stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_tee(&self, spec: &CommandSpec) -> Result<String, CommandError> {
        info!(command = %spec, "Running command (streaming)");

        let mut cmd = Self::command(spec);
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| Self::spawn_error(spec, e))?;

        let stdout = child.stdout.take().map(|s| tee_lines(s, false));
        let stderr = child.stderr.take().map(|s| tee_lines(s, true));

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(self.timeout_error(spec));
                }
            },
            None => child.wait().await,
        }
        .map_err(|e| Self::spawn_error(spec, e))?;

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;

        if status.success() {
            return Ok(stdout);
        }

        let code = status.code().unwrap_or(-1);
        info!(command = %spec, exit_code = code, "Streaming command failed");
        Err(CommandError::Exit {
            argv: spec.argv(),
            code,
            stdout,
            stderr,
        })
    }
}

/// Echo every line of `stream` to the console and return everything read.
fn tee_lines<R>(stream: R, is_stderr: bool) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut captured = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    if is_stderr {
                        eprint!("{}", line);
                    } else {
                        print!("{}", line);
                    }
                    captured.push_str(&line);
                }
                Err(e) => {
                    error!(error = %e, "Error reading command output");
                    break;
                }
            }
        }
        captured
    })
}

async fn collect(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

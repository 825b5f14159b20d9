//! Error types for engine invocation.

use thiserror::Error;

/// A failed external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be spawned.
    #[error("Failed to spawn `{}`: {source}", .argv.join(" "))]
    Spawn {
        argv: Vec<String>,
        #[source]
        source: std::io::Error,
    },

    /// A file operation the command depends on failed.
    #[error("Failed to prepare `{}`: {source}", .argv.join(" "))]
    Io {
        argv: Vec<String>,
        #[source]
        source: std::io::Error,
    },

    /// The process exited with a non-zero status.
    #[error("`{}` exited with code {code}{}", .argv.join(" "), captured(.stdout, .stderr))]
    Exit {
        argv: Vec<String>,
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// The process exceeded the configured deadline and was killed.
    #[error("`{}` timed out after {secs}s", .argv.join(" "))]
    Timeout { argv: Vec<String>, secs: u64 },
}

impl CommandError {
    /// Argument vector of the failed command.
    pub fn argv(&self) -> &[String] {
        match self {
            Self::Spawn { argv, .. }
            | Self::Io { argv, .. }
            | Self::Exit { argv, .. }
            | Self::Timeout { argv, .. } => argv,
        }
    }

    /// The failed command line, joined with spaces.
    pub fn command_line(&self) -> String {
        self.argv().join(" ")
    }

    /// Exit code, if the process ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The most useful captured output: stderr, or stdout if stderr is empty.
    pub fn output(&self) -> &str {
        match self {
            Self::Exit { stdout, stderr, .. } => {
                if stderr.trim().is_empty() {
                    stdout.trim()
                } else {
                    stderr.trim()
                }
            }
            _ => "",
        }
    }
}

fn captured(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();
    if !stdout.trim().is_empty() {
        out.push_str("\nstdout: ");
        out.push_str(stdout.trim());
    }
    if !stderr.trim().is_empty() {
        out.push_str("\nstderr: ");
        out.push_str(stderr.trim());
    }
    out
}

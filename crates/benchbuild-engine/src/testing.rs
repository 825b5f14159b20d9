//! A fake engine for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::CommandError;
use crate::runner::{CommandRunner, CommandSpec};

/// Exit code returned for calls nobody scripted.
pub const UNSCRIPTED_EXIT_CODE: i32 = 127;

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Exit 0 with this stdout.
    Ok(String),
    /// Exit non-zero with this stderr.
    Exit { code: i32, stderr: String },
}

/// A call the runner received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Full argument vector, program first.
    pub argv: Vec<String>,
    /// True if the call went through `run_tee`.
    pub tee: bool,
}

/// [`CommandRunner`] that replays scripted outcomes in order and records
/// every call. Once the script is exhausted it answers with the fallback,
/// or fails with [`UNSCRIPTED_EXIT_CODE`] if there is none.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<Scripted>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRunner {
    /// Create a runner with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner that succeeds with `stdout` for every call.
    pub fn always_ok(stdout: impl Into<String>) -> Self {
        Self {
            fallback: Some(Scripted::Ok(stdout.into())),
            ..Self::default()
        }
    }

    /// Builder method to script a successful call.
    pub fn push_ok(self, stdout: impl Into<String>) -> Self {
        self.push(Scripted::Ok(stdout.into()))
    }

    /// Builder method to script a failing call.
    pub fn push_exit(self, code: i32, stderr: impl Into<String>) -> Self {
        self.push(Scripted::Exit {
            code,
            stderr: stderr.into(),
        })
    }

    fn push(self, outcome: Scripted) -> Self {
        self.script
            .lock()
            .expect("script lock poisoned")
            .push_back(outcome);
        self
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock poisoned").len()
    }

    fn answer(&self, spec: &CommandSpec, tee: bool) -> Result<String, CommandError> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(RecordedCall {
                argv: spec.argv(),
                tee,
            });

        let next = self
            .script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .or_else(|| self.fallback.clone());

        match next {
            Some(Scripted::Ok(stdout)) => Ok(stdout),
            Some(Scripted::Exit { code, stderr }) => Err(CommandError::Exit {
                argv: spec.argv(),
                code,
                stdout: String::new(),
                stderr,
            }),
            None => Err(CommandError::Exit {
                argv: spec.argv(),
                code: UNSCRIPTED_EXIT_CODE,
                stdout: String::new(),
                stderr: "unscripted command".to_string(),
            }),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<String, CommandError> {
        self.answer(spec, false)
    }

    async fn run_tee(&self, spec: &CommandSpec) -> Result<String, CommandError> {
        self.answer(spec, true)
    }
}

//! Command runner: the only place child processes are spawned.
//!
//! The [`CommandRunner`] trait decouples the reconciler from real process
//! execution. Tests use scripted runners that return predetermined results
//! without spawning anything.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, error, instrument};

use crate::error::ForkflowError;

/// A single external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory for the child process.
    pub workdir: PathBuf,
    /// Extra environment entries for this invocation only.
    pub env: Vec<(String, String)>,
}

impl CommandRequest {
    pub fn new(program: &str, args: &[&str], workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            workdir: workdir.into(),
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// `program arg1 arg2 ...`, for logs and error messages.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Process exit code; `-1` when terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Abstraction over process execution.
pub trait CommandRunner {
    /// Run to completion. A nonzero exit is reported in the result, not as an error;
    /// errors mean the command could not be run at all.
    fn run(&self, request: &CommandRequest) -> Result<CommandResult>;

    /// Run and fail with [`ForkflowError::CommandFailed`] on nonzero exit.
    fn run_checked(&self, request: &CommandRequest) -> Result<CommandResult> {
        let result = self.run(request)?;
        if !result.success() {
            return Err(ForkflowError::CommandFailed {
                command: request.display(),
                exit_code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            }
            .into());
        }
        Ok(result)
    }

    /// Run checked and return trimmed stdout.
    fn run_capture(&self, request: &CommandRequest) -> Result<String> {
        let result = self.run_checked(request)?;
        Ok(result.stdout.trim().to_string())
    }
}

/// Runner backed by `std::process::Command`. Blocks until the child exits.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    env: Vec<(String, String)>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `key=value` to every child this runner spawns.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }
}

impl CommandRunner for SystemRunner {
    #[instrument(skip_all, fields(command = %request.display()))]
    fn run(&self, request: &CommandRequest) -> Result<CommandResult> {
        debug!(workdir = %request.workdir.display(), "spawning child process");
        let output = Command::new(&request.program)
            .args(&request.args)
            .current_dir(&request.workdir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .output()
            .inspect_err(|e| error!(err = %e, "failed to spawn command"))
            .with_context(|| format!("spawn {}", request.display()))?;

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(exit_code, "command finished");
        Ok(CommandResult {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

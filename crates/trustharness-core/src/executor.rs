//! Subprocess execution for the trust client.
//!
//! The harness never inspects how a command is run; it hands an
//! [`Invocation`] to a [`CommandExecutor`] and gets back the captured output
//! and exit status. Interactive input is an explicit [`StdinScript`] so the
//! conversation with the client can be asserted on without a real process.

use std::collections::BTreeMap;
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use xshell::Shell;

use crate::error::HarnessError;

/// One expected prompt and the line typed in answer to it.
///
/// The prompt text is descriptive only; responses are written in order
/// without waiting for the prompt to appear.
#[derive(Clone)]
pub struct PromptResponse {
    /// What the client is expected to ask for.
    pub prompt: &'static str,
    /// The line answered (without trailing newline).
    pub response: SecretString,
}

impl PromptResponse {
    /// Creates a prompt/response pair.
    pub fn new(prompt: &'static str, response: impl Into<String>) -> Self {
        Self {
            prompt,
            response: SecretString::from(response.into()),
        }
    }
}

impl std::fmt::Debug for PromptResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptResponse")
            .field("prompt", &self.prompt)
            .field("response", &"[REDACTED]")
            .finish()
    }
}

/// Finite sequence of interactive answers fed to a command.
///
/// The whole script is written once, then standard input is closed.
#[derive(Debug, Clone, Default)]
pub struct StdinScript {
    responses: Vec<PromptResponse>,
}

impl StdinScript {
    /// An empty script: standard input is closed immediately.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            responses: Vec::new(),
        }
    }

    /// Appends a response.
    #[must_use]
    pub fn then(mut self, prompt: &'static str, response: impl Into<String>) -> Self {
        self.responses.push(PromptResponse::new(prompt, response));
        self
    }

    /// Appends every response of `other` after this script's responses.
    #[must_use]
    pub fn chain(mut self, other: &Self) -> Self {
        self.responses.extend(other.responses.iter().cloned());
        self
    }

    /// The responses in the order they are written.
    #[must_use]
    pub fn responses(&self) -> &[PromptResponse] {
        &self.responses
    }

    /// Prompt labels in order, for logs and assertions.
    #[must_use]
    pub fn prompts(&self) -> Vec<&'static str> {
        self.responses.iter().map(|r| r.prompt).collect()
    }

    /// Returns `true` when nothing is written to standard input.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Renders the bytes written to standard input: each response followed
    /// by a newline.
    #[must_use]
    pub fn render(&self) -> String {
        let mut rendered = String::new();
        for entry in &self.responses {
            rendered.push_str(entry.response.expose_secret());
            rendered.push('\n');
        }
        rendered
    }
}

/// A fully described command invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Program to run.
    pub program: PathBuf,
    /// Arguments, global flags first.
    pub args: Vec<String>,
    /// Extra environment on top of the inherited one.
    pub env: BTreeMap<String, SecretString>,
    /// Interactive input.
    pub stdin: StdinScript,
}

impl Invocation {
    /// Renders `program arg…` for logs and errors. Environment values are
    /// never included.
    #[must_use]
    pub fn display_command(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.display().to_string());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Returns the argument that follows `flag`, if present.
    #[must_use]
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Exit code; `None` when terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ExecutionOutput {
    /// A successful run with the given output.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(0),
        }
    }

    /// Returns `true` for exit code zero.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Runs trust-client invocations.
///
/// Implementations report the exit status without judging it; callers turn
/// non-zero statuses into [`HarnessError::CommandFailed`].
pub trait CommandExecutor {
    /// Runs the invocation to completion.
    fn execute(&self, invocation: &Invocation) -> Result<ExecutionOutput, HarnessError>;
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for &E {
    fn execute(&self, invocation: &Invocation) -> Result<ExecutionOutput, HarnessError> {
        (**self).execute(invocation)
    }
}

/// Production executor backed by `xshell`.
pub struct ShellExecutor {
    sh: Shell,
}

impl ShellExecutor {
    /// Creates an executor rooted at the current directory.
    pub fn new() -> Result<Self, HarnessError> {
        let sh = Shell::new().map_err(|e| HarnessError::Launch {
            command: "<shell>".to_string(),
            source: e,
        })?;
        Ok(Self { sh })
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<ExecutionOutput, HarnessError> {
        let mut cmd = self
            .sh
            .cmd(&invocation.program)
            .args(&invocation.args)
            .stdin(invocation.stdin.render())
            .ignore_status()
            .quiet();

        for (name, value) in &invocation.env {
            cmd = cmd.env(name, value.expose_secret());
        }

        let output = cmd.output().map_err(|e| HarnessError::Launch {
            command: invocation.display_command(),
            source: e,
        })?;

        Ok(ExecutionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

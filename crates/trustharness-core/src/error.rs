//! Harness-wide error types.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::changefeed::ChangeFeedError;

/// Errors that abort a conformance run.
///
/// Every variant is fatal: the run stops at the first error and no partial
/// result is reported.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HarnessError {
    /// The trust client exited with a non-zero status.
    #[error("command `{command}` failed with {}:\n{output}", exit_label(.exit_code))]
    CommandFailed {
        /// The rendered command line (secrets excluded).
        command: String,
        /// Exit code, `None` when the process was killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard output.
        output: String,
    },

    /// The trust client could not be started.
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        /// The rendered command line.
        command: String,
        /// Underlying spawn error.
        #[source]
        source: xshell::Error,
    },

    /// An invariant comparison did not hold.
    #[error("assertion failed in {scenario}: {message}")]
    Assertion {
        /// Scenario that raised the failure.
        scenario: &'static str,
        /// What was expected and what was observed.
        message: String,
    },

    /// The change feed could not be queried or returned malformed data.
    #[error(transparent)]
    ChangeFeed(#[from] ChangeFeedError),

    /// Locally cached trust metadata was missing or malformed.
    #[error("invalid metadata at {}: {reason}", .path.display())]
    Metadata {
        /// File that was read.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// Local filesystem failure.
    #[error("{context}: {source}")]
    Io {
        /// What the harness was doing.
        context: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A scenario's declared change-count precondition does not follow from
    /// the scenarios before it.
    #[error(
        "scenario {scenario} expects {declared} prior changes but the pipeline before it produces {actual}"
    )]
    PipelineOrder {
        /// The misplaced scenario.
        scenario: &'static str,
        /// Precondition declared by the scenario.
        declared: u64,
        /// Sum of the changes added by every earlier scenario.
        actual: u64,
    },
}

#[allow(clippy::ref_option)]
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "no exit code".to_string(), |code| format!("exit code {code}"))
}

impl HarnessError {
    /// Builds an assertion failure.
    pub fn assertion(scenario: &'static str, message: impl Into<String>) -> Self {
        Self::Assertion {
            scenario,
            message: message.into(),
        }
    }

    /// Wraps an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Classifies this error for reporting.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::CommandFailed { .. } | Self::Launch { .. } => FailureKind::Execution,
            Self::Assertion { .. } | Self::PipelineOrder { .. } => FailureKind::Assertion,
            Self::ChangeFeed(error) => {
                if error.is_transport() {
                    FailureKind::Transport
                } else {
                    FailureKind::Protocol
                }
            },
            Self::Metadata { .. } => FailureKind::Protocol,
            Self::Io { .. } => FailureKind::Local,
        }
    }
}

/// Coarse classification of a run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The trust client failed or could not be started.
    Execution,
    /// An expected property of the observed state did not hold.
    Assertion,
    /// The remote service could not be reached.
    Transport,
    /// The remote service or local metadata had an unexpected shape.
    Protocol,
    /// Local filesystem trouble.
    Local,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execution => write!(f, "execution"),
            Self::Assertion => write!(f, "assertion"),
            Self::Transport => write!(f, "transport"),
            Self::Protocol => write!(f, "protocol"),
            Self::Local => write!(f, "local"),
        }
    }
}

//! Two-level error taxonomy for test execution.
//!
//! Every error that escapes a step is either *broken* (an engine or spec
//! problem that should abort the test and never be swallowed) or a
//! *failure* (the thing under test misbehaved). Steps marked `fails: true`
//! downgrade failures to success; broken errors always propagate.

use std::fmt;

use thiserror::Error;

/// Error produced while executing a test.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An engine or spec bug: missing phase, malformed pattern, illegal
    /// script value, and the like. Never downgraded by `fails`.
    #[error("broken: {0}")]
    Broken(String),
    /// An expected-kind test error: timeouts, schema complaints, guard
    /// failures, channel refusals.
    #[error("{0}")]
    Failure(String),
}

impl Error {
    /// Builds a broken error from anything displayable.
    pub fn broken(msg: impl fmt::Display) -> Self {
        Self::Broken(msg.to_string())
    }

    /// Builds a failure from anything displayable.
    pub fn failure(msg: impl fmt::Display) -> Self {
        Self::Failure(msg.to_string())
    }

    /// True when the error is broken rather than a test failure.
    pub fn is_broken(&self) -> bool {
        matches!(self, Self::Broken(_))
    }

    /// Prefixes the message with `step N: ` without changing the class.
    pub(crate) fn wrap_step(self, index: usize) -> Self {
        match self {
            Self::Broken(msg) => Self::Broken(format!("step {index}: {msg}")),
            Self::Failure(msg) => Self::Failure(format!("step {index}: {msg}")),
        }
    }
}

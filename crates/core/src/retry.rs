//! Attempt/retry state machine for a single conversion task.
//!
//! ```text
//! Idle -> Attempting -> Succeeded
//!              |
//!              +-> Retrying -> Attempting ...
//!              +-> Failed
//! ```
//!
//! Every failed attempt, validation failures included, consumes one unit of
//! the attempt budget. A failure that is not retryable (cancellation, a
//! missing input) moves straight to `Failed`.

use crate::error::{ConversionError, FailureKind};

/// Why an attempt did not produce an accepted output.
///
/// A cloneable snapshot of the [`ConversionError`] that ended the attempt:
/// its classification, whether it may be retried, and its diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    kind: FailureKind,
    retryable: bool,
    errors: Vec<String>,
}

impl From<ConversionError> for AttemptFailure {
    fn from(err: ConversionError) -> Self {
        let errors = match &err {
            ConversionError::ValidationFailure { errors } => errors.clone(),
            other => vec![other.to_string()],
        };
        Self {
            kind: err.kind(),
            retryable: err.is_retryable(),
            errors,
        }
    }
}

impl AttemptFailure {
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Individual diagnostics.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Single-line summary.
    pub fn message(&self) -> String {
        self.errors.join("; ")
    }
}

/// Current position in the attempt lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Attempting { attempt: u32 },
    Retrying { attempt: u32, failure: AttemptFailure },
    Succeeded { attempts: u32 },
    Failed { attempts: u32, failure: AttemptFailure },
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Drives a bounded number of attempts.
#[derive(Debug, Clone)]
pub struct RetryStateMachine {
    max_attempts: u32,
    attempts: u32,
    state: AttemptState,
}

impl RetryStateMachine {
    /// `max_attempts` below 1 is treated as 1.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempts: 0,
            state: AttemptState::Idle,
        }
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `Idle`/`Retrying` -> `Attempting`. Returns the 1-based attempt number,
    /// or `None` if no attempt may start from the current state.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        match self.state {
            AttemptState::Idle | AttemptState::Retrying { .. } => {
                self.attempts += 1;
                self.state = AttemptState::Attempting {
                    attempt: self.attempts,
                };
                Some(self.attempts)
            }
            _ => None,
        }
    }

    /// `Attempting` -> `Succeeded`.
    pub fn succeed(&mut self) -> &AttemptState {
        if let AttemptState::Attempting { attempt } = self.state {
            self.state = AttemptState::Succeeded { attempts: attempt };
        }
        &self.state
    }

    /// `Attempting` -> `Retrying` while budget remains and the failure is
    /// retryable, else `Failed`.
    pub fn fail(&mut self, failure: AttemptFailure) -> &AttemptState {
        if let AttemptState::Attempting { attempt } = self.state {
            self.state = if failure.is_retryable() && attempt < self.max_attempts {
                AttemptState::Retrying { attempt, failure }
            } else {
                AttemptState::Failed {
                    attempts: attempt,
                    failure,
                }
            };
        }
        &self.state
    }

    /// Any non-terminal state -> `Failed(Cancelled)`.
    pub fn cancel(&mut self) -> &AttemptState {
        if !self.state.is_terminal() {
            self.state = AttemptState::Failed {
                attempts: self.attempts,
                failure: ConversionError::Cancelled.into(),
            };
        }
        &self.state
    }
}

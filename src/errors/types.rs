//! Error type definitions for the job scheduling subsystem
//!
//! This module defines all error types surfaced by the scheduler API,
//! providing a single taxonomy that separates programmer errors (state and
//! nesting violations) from control-flow outcomes (cancellation,
//! interruption) and faults raised by user job code.

use thiserror::Error;

/// Top-level scheduler error type
///
/// This enum represents all errors that the scheduler can return to a
/// caller. It uses `thiserror` to provide automatic error trait
/// implementations and proper error chaining.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// An operation was attempted in a state that does not permit it,
    /// such as scheduling a job that is already waiting or running.
    #[error("illegal state: {message}")]
    IllegalState { message: String },

    /// An argument did not match the required protocol, such as ending a
    /// rule that does not match the most recent begin.
    #[error("illegal argument: {message}")]
    IllegalArgument { message: String },

    /// A rule was begun that is not contained within the thread's current
    /// outermost rule.
    #[error("illegal rule nesting: {message}")]
    IllegalNesting { message: String },

    /// A blocking wait was abandoned because the supplied progress monitor
    /// reported cancellation.
    #[error("operation canceled")]
    OperationCanceled,

    /// A blocking wait was abandoned because the manager shut down while
    /// the caller was parked.
    #[error("interrupted while waiting")]
    Interrupted,

    /// An unrecoverable fault raised by user job code, caught at the
    /// worker boundary.
    #[error("job execution fault: {0}")]
    ExecutionFault(#[from] anyhow::Error),
}

impl SchedulerError {
    /// Build an [`SchedulerError::IllegalState`] from any displayable message
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Build an [`SchedulerError::IllegalArgument`] from any displayable message
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument {
            message: message.into(),
        }
    }

    /// Build an [`SchedulerError::IllegalNesting`] from any displayable message
    pub fn illegal_nesting(message: impl Into<String>) -> Self {
        Self::IllegalNesting {
            message: message.into(),
        }
    }

    /// Whether this error is the cooperative-cancellation outcome
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::OperationCanceled)
    }
}

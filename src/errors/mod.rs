//! Centralized error handling for the job scheduling subsystem
//!
//! # Error Categories
//!
//! - **State violations**: scheduling an already-active job, reconfiguring
//!   the manager after shutdown
//! - **Argument/nesting violations**: ending a rule without a matching
//!   begin, beginning a rule outside its containing rule
//! - **Cancellation/interruption**: cooperative termination of blocking
//!   waits (`begin_rule`, `join`, `Lock::acquire`)
//! - **Execution faults**: errors and panics raised by user job code,
//!   caught at the worker boundary and reported through listeners
//!
//! Nesting and state violations are programmer errors and propagate
//! synchronously to the API caller. Faults in job work never propagate:
//! they become a terminal job status delivered via listener notification.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using SchedulerError
pub type SchedulerResult<T> = Result<T, SchedulerError>;

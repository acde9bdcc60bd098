//! Per-thread rule nesting state
//!
//! Each thread inside one or more `begin_rule`/`end_rule` spans (or running
//! a job) has a context recording the stack of begun rules and the job
//! currently executing on it. Rules must be ended in exactly the reverse
//! order they were begun. The effective rule for conflict computation is
//! the outermost non-null entry; a begun null rule occupies a stack slot
//! (and must be ended) but never participates in conflicts.

use crate::rules::Rule;
use crate::scheduling::job::Job;

#[derive(Default)]
pub(crate) struct ThreadRuleContext {
    /// Begun rules, outermost first. `None` entries are begun null rules.
    pub(crate) stack: Vec<Option<Rule>>,
    /// The job currently running on this thread, if any.
    pub(crate) current_job: Option<Job>,
}

impl ThreadRuleContext {
    /// The outermost non-null rule, used for all conflict comparisons.
    pub(crate) fn effective_rule(&self) -> Option<&Rule> {
        self.stack.iter().flatten().next()
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.stack.is_empty() && self.current_job.is_none()
    }
}

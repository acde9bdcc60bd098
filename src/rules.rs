//! Scheduling rules
//!
//! A scheduling rule is a value describing which resources a job or a
//! begin/end span will touch. Rules drive two decisions:
//!
//! - **Conflict**: two conflicting rules are never active on two threads at
//!   the same time. Conflict is symmetric; the engine additionally treats
//!   identical rule instances as conflicting regardless of what
//!   `is_conflicting` reports.
//! - **Containment**: a nested `begin_rule` is only legal when the inner
//!   rule is contained by the thread's current outermost rule. Containment
//!   must be reflexive.
//!
//! Rule identity (for matching `end_rule` against `begin_rule`) is `Arc`
//! pointer identity, not structural equality.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Contract for user-defined scheduling rules.
pub trait SchedulingRule: fmt::Debug + Send + Sync {
    /// Whether all resources touched by `other` are covered by this rule.
    /// Must be reflexive: a rule contains itself.
    fn contains(&self, other: &dyn SchedulingRule) -> bool;

    /// Whether this rule and `other` touch overlapping resources. Expected
    /// to be symmetric; the engine evaluates both directions regardless.
    fn is_conflicting(&self, other: &dyn SchedulingRule) -> bool;

    /// Downcast support so rule implementations can recognize their own
    /// concrete type in `contains`/`is_conflicting`.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a scheduling rule.
pub type Rule = Arc<dyn SchedulingRule>;

/// Pointer identity for rule handles.
pub(crate) fn same_rule(a: &Rule, b: &Rule) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Symmetric conflict test used by the queue and the rule engine.
pub(crate) fn conflicting(a: &Rule, b: &Rule) -> bool {
    same_rule(a, b) || a.is_conflicting(b.as_ref()) || b.is_conflicting(a.as_ref())
}

/// A hierarchical rule over a `/`-separated resource path.
///
/// `PathRule::new("db")` contains and conflicts with
/// `PathRule::new("db/accounts")`; sibling paths neither contain nor
/// conflict. This is the stock rule implementation used when jobs contend
/// for tree-shaped resources; callers with other sharing semantics
/// implement [`SchedulingRule`] directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathRule {
    segments: Vec<String>,
}

impl PathRule {
    pub fn new(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Convenience constructor returning a shared rule handle.
    pub fn shared(path: &str) -> Rule {
        Arc::new(Self::new(path))
    }

    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    fn is_prefix_of(&self, other: &PathRule) -> bool {
        self.segments.len() <= other.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }
}

impl SchedulingRule for PathRule {
    fn contains(&self, other: &dyn SchedulingRule) -> bool {
        match other.as_any().downcast_ref::<PathRule>() {
            Some(other) => self.is_prefix_of(other),
            None => false,
        }
    }

    fn is_conflicting(&self, other: &dyn SchedulingRule) -> bool {
        match other.as_any().downcast_ref::<PathRule>() {
            Some(other) => self.is_prefix_of(other) || other.is_prefix_of(self),
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_rule_containment() {
        let root = PathRule::new("db");
        let child = PathRule::new("db/accounts");
        let sibling = PathRule::new("cache");

        assert!(root.contains(&child));
        assert!(!child.contains(&root));
        assert!(root.contains(&root));
        assert!(!root.contains(&sibling));
    }

    #[test]
    fn test_path_rule_conflict_is_symmetric() {
        let root = PathRule::new("db");
        let child = PathRule::new("db/accounts");
        let sibling = PathRule::new("cache");

        assert!(root.is_conflicting(&child));
        assert!(child.is_conflicting(&root));
        assert!(!root.is_conflicting(&sibling));
        assert!(!sibling.is_conflicting(&root));
    }

    #[test]
    fn test_identical_instances_always_conflict() {
        let rule = PathRule::shared("a");
        assert!(conflicting(&rule, &rule.clone()));
    }

    #[test]
    fn test_distinct_equal_rules_conflict_via_predicate() {
        let a = PathRule::shared("db");
        let b = PathRule::shared("db");
        assert!(!same_rule(&a, &b));
        assert!(conflicting(&a, &b));
    }

    #[test]
    fn test_empty_segments_ignored() {
        let rule = PathRule::new("/db//accounts/");
        assert_eq!(rule.path(), "db/accounts");
    }
}

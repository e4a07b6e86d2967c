//! Boolean condition sets attached to response segments.
//!
//! A collection is the AND of its entries, each entry XOR its own
//! negation flag, and the whole result XOR the collection's negation.
//! The empty collection is true. Collections are re-evaluated on every
//! descent with no memoization, so variable changes made earlier in the
//! same tick are observed.

use std::sync::Arc;

use crate::context::ConditionContext;
use crate::registry::ResponseCondition;

/// One leaf condition with an optional per-entry negation.
#[derive(Debug, Clone)]
pub struct ConditionEntry {
    /// The condition itself.
    pub condition: Arc<dyn ResponseCondition>,
    /// Whether this entry's result is inverted.
    pub negated: bool,
}

/// The condition set of a segment.
#[derive(Debug, Clone, Default)]
pub struct ConditionsCollection {
    entries: Vec<ConditionEntry>,
    negated: bool,
}

impl ConditionsCollection {
    /// An empty (always-true) collection.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            negated: false,
        }
    }

    /// Add a condition entry.
    pub fn push(&mut self, condition: Arc<dyn ResponseCondition>, negated: bool) {
        self.entries.push(ConditionEntry { condition, negated });
    }

    /// Builder-style entry addition.
    #[must_use]
    pub fn with(mut self, condition: Arc<dyn ResponseCondition>, negated: bool) -> Self {
        self.push(condition, negated);
        self
    }

    /// Invert the whole collection's result.
    pub const fn set_negated(&mut self, negated: bool) {
        self.negated = negated;
    }

    /// Builder-style whole-set negation.
    #[must_use]
    pub const fn negated(mut self) -> Self {
        self.negated = true;
        self
    }

    /// Number of entries. Drives descending-count child sorting in the
    /// segment tree.
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection has no entries.
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluate the collection against the given context.
    pub fn is_met(&self, ctx: &ConditionContext<'_>) -> bool {
        let all = self
            .entries
            .iter()
            .all(|entry| entry.condition.is_met(ctx) != entry.negated);
        all != self.negated
    }
}

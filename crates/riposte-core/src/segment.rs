//! The response segment tree.
//!
//! A program owns its segments arena-style: nodes live in one `Vec` and
//! refer to each other by [`SegmentId`] index, so running instances hold
//! plain indices and never outlive or alias the tree. Children are kept
//! sorted descending by condition count at build time, which lets the
//! selection scan stop early once no later child can match more
//! conditions than the best candidate found so far.

use std::sync::Arc;

use rand::Rng;
use tracing::warn;

use crate::conditions::ConditionsCollection;
use crate::context::ConditionContext;
use crate::registry::ResponseAction;

/// Index of a segment within its owning program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentId(usize);

/// An action with its start delay relative to segment entry.
#[derive(Debug, Clone)]
pub struct TimedAction {
    /// The action to run.
    pub action: Arc<dyn ResponseAction>,
    /// Seconds to wait after segment entry before executing. Zero or
    /// negative runs immediately.
    pub delay: f32,
}

impl TimedAction {
    /// An action that runs immediately on segment entry.
    pub const fn immediate(action: Arc<dyn ResponseAction>) -> Self {
        Self { action, delay: 0.0 }
    }

    /// An action that runs `delay` seconds after segment entry.
    pub const fn delayed(action: Arc<dyn ResponseAction>, delay: f32) -> Self {
        Self { action, delay }
    }
}

/// One node of a response program: conditions, actions, children.
#[derive(Debug, Clone, Default)]
pub struct ResponseSegment {
    /// Authored name, for logs and debugging.
    pub name: String,
    /// Conditions gating descent into this segment.
    pub conditions: ConditionsCollection,
    /// Actions run on segment entry, in authored order.
    pub actions: Vec<TimedAction>,
    /// Child ids, sorted descending by condition count. Populated by
    /// the builder; immutable during traversal.
    children: Vec<SegmentId>,
}

impl ResponseSegment {
    /// A segment with the given name and no conditions or actions.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style condition-set override.
    #[must_use]
    pub fn with_conditions(mut self, conditions: ConditionsCollection) -> Self {
        self.conditions = conditions;
        self
    }

    /// Builder-style action addition.
    #[must_use]
    pub fn with_action(mut self, action: TimedAction) -> Self {
        self.actions.push(action);
        self
    }

    /// The sorted child ids.
    pub fn children(&self) -> &[SegmentId] {
        &self.children
    }
}

/// A whole segment tree bound to one signal name.
#[derive(Debug, Clone)]
pub struct ResponseProgram {
    segments: Vec<ResponseSegment>,
    root: SegmentId,
}

impl ResponseProgram {
    /// The root segment id.
    pub const fn root(&self) -> SegmentId {
        self.root
    }

    /// Look up a segment by id.
    pub fn segment(&self, id: SegmentId) -> Option<&ResponseSegment> {
        self.segments.get(id.0)
    }

    /// Number of segments in the tree.
    pub const fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the tree is empty. Always false for built programs.
    pub const fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Pick the child to descend into from `from`, or `None` at a leaf.
    ///
    /// Scans the pre-sorted children tracking the best matched condition
    /// count so far and stops as soon as a child's count drops below it.
    /// Children whose conditions hold and whose count equals the best
    /// are candidates; ties are broken uniformly at random on the
    /// context's seeded RNG.
    pub(crate) fn select_child(
        &self,
        from: SegmentId,
        ctx: &ConditionContext<'_>,
    ) -> Option<SegmentId> {
        let segment = self.segment(from)?;
        let mut best = 0usize;
        let mut candidates: Vec<SegmentId> = Vec::new();

        for &child_id in &segment.children {
            let Some(child) = self.segment(child_id) else {
                warn!(segment = %segment.name, ?child_id, "Dangling child id in segment tree");
                continue;
            };
            let count = child.conditions.len();
            if count < best {
                break;
            }
            if child.conditions.is_met(ctx) {
                if count > best {
                    best = count;
                    candidates.clear();
                }
                candidates.push(child_id);
            }
        }

        match candidates.len() {
            0 => None,
            1 => candidates.first().copied(),
            n => {
                let pick = ctx.rng.borrow_mut().random_range(0..n);
                candidates.get(pick).copied()
            }
        }
    }
}

/// Constructs a [`ResponseProgram`], sorting children on build.
#[derive(Debug)]
pub struct ProgramBuilder {
    segments: Vec<ResponseSegment>,
}

impl ProgramBuilder {
    /// Start a program from its root segment.
    pub fn new(root: ResponseSegment) -> Self {
        Self {
            segments: vec![root],
        }
    }

    /// The root segment id, for attaching children.
    pub const fn root(&self) -> SegmentId {
        SegmentId(0)
    }

    /// Attach `segment` as a child of `parent` and return its id.
    /// Unknown parents attach to the root.
    pub fn add_child(&mut self, parent: SegmentId, segment: ResponseSegment) -> SegmentId {
        let id = SegmentId(self.segments.len());
        self.segments.push(segment);
        match self.segments.get_mut(parent.0) {
            Some(node) => node.children.push(id),
            None => {
                warn!(?parent, "Unknown parent segment, attaching to root");
                if let Some(root) = self.segments.first_mut() {
                    root.children.push(id);
                }
            }
        }
        id
    }

    /// Finish the program: sorts every child list descending by
    /// condition count so selection can early-exit.
    #[must_use]
    pub fn build(mut self) -> ResponseProgram {
        let counts: Vec<usize> = self
            .segments
            .iter()
            .map(|segment| segment.conditions.len())
            .collect();
        for segment in &mut self.segments {
            segment
                .children
                .sort_by_key(|child| core::cmp::Reverse(counts.get(child.0).copied().unwrap_or(0)));
        }
        ResponseProgram {
            segments: self.segments,
            root: SegmentId(0),
        }
    }
}

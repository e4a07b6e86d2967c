//! Running response instances.
//!
//! An instance is one execution of a response program for one signal:
//! it enters the root segment, runs that segment's actions, and once no
//! blocking action remains descends one child per tick until it reaches
//! a leaf. Conditions are re-evaluated on every descent, so variable
//! changes made mid-execution are observed.

use std::sync::Arc;

use tracing::{debug, warn};

use riposte_types::{ActorId, InstanceId};

use crate::context::{AdvanceEnv, ExecutionContext, SignalSnapshot};
use crate::registry::{ActionInstance, ActionState, ResponseAction};
use crate::segment::{ResponseProgram, SegmentId};

/// Lifecycle state of a response instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Created this tick; enters the root segment on its first advance.
    Created,
    /// Progressing through the tree.
    Advancing,
    /// Held in place by at least one blocking action.
    Blocked,
    /// Ran to completion. Terminal.
    Finished,
    /// Canceled. Terminal.
    Canceled,
}

impl InstanceState {
    /// Whether the instance is done and ready for cleanup.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Canceled)
    }
}

/// Wraps an action whose start is delayed relative to segment entry.
///
/// Blocks until the delay elapses, then executes the real action and
/// forwards polling and cancellation to whatever instance it produced.
#[derive(Debug)]
struct DeferredAction {
    action: Arc<dyn ResponseAction>,
    ready_at: f64,
    fired: bool,
    inner: Option<Box<dyn ActionInstance>>,
}

impl DeferredAction {
    const fn new(action: Arc<dyn ResponseAction>, ready_at: f64) -> Self {
        Self {
            action,
            ready_at,
            fired: false,
            inner: None,
        }
    }
}

impl ActionInstance for DeferredAction {
    fn poll(&mut self, ctx: &mut ExecutionContext<'_>) -> ActionState {
        if !self.fired {
            if ctx.now < self.ready_at {
                return ActionState::Running;
            }
            self.fired = true;
            self.inner = self.action.execute(ctx);
        }
        match self.inner.as_mut() {
            Some(inner) => inner.poll(ctx),
            // Instantaneous action; nothing left to track.
            None => ActionState::Finished,
        }
    }

    fn cancel(&mut self, ctx: &mut ExecutionContext<'_>) -> ActionState {
        match self.inner.as_mut() {
            Some(inner) => inner.cancel(ctx),
            None => ActionState::Canceled,
        }
    }
}

/// One running execution of a response program.
#[derive(Debug)]
pub struct ResponseInstance {
    id: InstanceId,
    signal: Arc<SignalSnapshot>,
    current_actor: Option<ActorId>,
    segment: Option<SegmentId>,
    active: Vec<Box<dyn ActionInstance>>,
    state: InstanceState,
    cancel_requested: bool,
}

impl ResponseInstance {
    /// Create an instance positioned at the program's root. The current
    /// actor starts as the signal's sender.
    pub(crate) fn new(id: InstanceId, signal: Arc<SignalSnapshot>, root: SegmentId) -> Self {
        let current_actor = signal.sender;
        Self {
            id,
            signal,
            current_actor,
            segment: Some(root),
            active: Vec::new(),
            state: InstanceState::Created,
            cancel_requested: false,
        }
    }

    /// The instance id.
    pub const fn id(&self) -> InstanceId {
        self.id
    }

    /// The signal this instance is answering.
    pub fn signal(&self) -> &SignalSnapshot {
        &self.signal
    }

    /// The actor the response currently addresses.
    pub const fn current_actor(&self) -> Option<ActorId> {
        self.current_actor
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> InstanceState {
        self.state
    }

    /// Request cancellation. The segment pointer is cleared immediately
    /// so no further descent happens; active actions are force-canceled
    /// and the `Canceled` state reported on the next scheduled pass.
    /// Idempotent.
    pub(crate) const fn request_cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.cancel_requested = true;
        self.segment = None;
    }

    /// Advance one tick: poll actions, then descend at most one segment.
    ///
    /// `program` is `None` when the program was removed from the library
    /// while this instance ran; the instance then cancels itself.
    pub(crate) fn advance(&mut self, program: Option<&ResponseProgram>, env: &mut AdvanceEnv<'_>) {
        if self.state.is_terminal() {
            return;
        }
        let signal = Arc::clone(&self.signal);

        if self.cancel_requested {
            self.teardown(&signal, env);
            self.state = InstanceState::Canceled;
            debug!(instance = %self.id, signal = %signal.name, "Instance canceled");
            return;
        }

        let Some(program) = program else {
            warn!(instance = %self.id, signal = %signal.name, "Program removed mid-run, canceling");
            self.segment = None;
            self.teardown(&signal, env);
            self.state = InstanceState::Canceled;
            return;
        };

        if self.state == InstanceState::Created {
            self.state = InstanceState::Advancing;
            if let Some(root) = self.segment {
                // Entering the root counts as this tick's descent.
                self.enter_segment(program, root, &signal, env);
            }
            return;
        }

        let blocked = self.poll_actions(&signal, env);
        if blocked {
            self.state = InstanceState::Blocked;
            return;
        }
        self.state = InstanceState::Advancing;

        if let Some(current) = self.segment {
            let view = crate::context::ConditionContext {
                now: env.now,
                variables: env.variables,
                signal: &signal,
                current_actor: self.current_actor,
                stats: env.stats,
                rng: env.rng,
            };
            match program.select_child(current, &view) {
                Some(child) => {
                    self.enter_segment(program, child, &signal, env);
                    return;
                }
                None => {
                    // Leaf reached. Remaining non-blocking actions are
                    // force-canceled rather than awaited.
                    self.segment = None;
                    self.teardown(&signal, env);
                }
            }
        }

        if self.segment.is_none() && self.active.is_empty() {
            self.state = InstanceState::Finished;
            debug!(instance = %self.id, signal = %signal.name, "Instance finished");
        }
    }

    /// Poll every active action, dropping terminal ones. Returns whether
    /// any blocking action remains.
    fn poll_actions(&mut self, signal: &SignalSnapshot, env: &mut AdvanceEnv<'_>) -> bool {
        let mut blocked = false;
        let mut kept: Vec<Box<dyn ActionInstance>> = Vec::new();
        let mut active = core::mem::take(&mut self.active);
        for mut action in active.drain(..) {
            let mut ctx = ExecutionContext::new(env, signal, self.id, self.current_actor);
            let state = action.poll(&mut ctx);
            if let Some(actor) = ctx.take_actor_change() {
                self.current_actor = Some(actor);
            }
            match state {
                ActionState::Running => {
                    blocked = true;
                    kept.push(action);
                }
                ActionState::RunningNonBlocking => kept.push(action),
                ActionState::Finished | ActionState::Canceled => {}
            }
        }
        self.active = kept;
        blocked
    }

    /// Run a segment's actions and make it current.
    fn enter_segment(
        &mut self,
        program: &ResponseProgram,
        id: SegmentId,
        signal: &SignalSnapshot,
        env: &mut AdvanceEnv<'_>,
    ) {
        let Some(segment) = program.segment(id) else {
            warn!(instance = %self.id, ?id, "Segment id out of bounds, ending descent");
            self.segment = None;
            return;
        };
        self.segment = Some(id);
        debug!(instance = %self.id, segment = %segment.name, "Entering segment");

        for timed in &segment.actions {
            if timed.delay > 0.0 {
                self.active.push(Box::new(DeferredAction::new(
                    Arc::clone(&timed.action),
                    env.now + f64::from(timed.delay),
                )));
                continue;
            }
            let mut ctx = ExecutionContext::new(env, signal, self.id, self.current_actor);
            let produced = timed.action.execute(&mut ctx);
            if let Some(actor) = ctx.take_actor_change() {
                self.current_actor = Some(actor);
            }
            if let Some(instance) = produced {
                self.active.push(instance);
            }
        }
    }

    /// Force-cancel and drop every active action.
    fn teardown(&mut self, signal: &SignalSnapshot, env: &mut AdvanceEnv<'_>) {
        let mut active = core::mem::take(&mut self.active);
        for mut action in active.drain(..) {
            let mut ctx = ExecutionContext::new(env, signal, self.id, self.current_actor);
            let _ = action.cancel(&mut ctx);
        }
    }
}

//! Execution and evaluation contexts threaded through actions and
//! conditions.
//!
//! There is no ambient global state: everything an action or condition
//! may touch (the variable store, the speaker scheduler, the originating
//! signal, execution statistics) is handed to it explicitly through one
//! of these context types, wired per tick by the dispatcher.

use std::cell::RefCell;
use std::collections::BTreeMap;

use rand::rngs::SmallRng;

use riposte_speech::SpeakerScheduler;
use riposte_types::{ActorId, InstanceId, SignalId};
use riposte_vars::{VariableCollection, VariableStore};

use crate::dispatcher::ExecutionStats;

/// Immutable snapshot of a raised signal, shared by the queue, the
/// running instance, and every context handed to plugins.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSnapshot {
    /// Unique id assigned when the signal was raised.
    pub id: SignalId,
    /// The signal name; also the response-program key.
    pub name: String,
    /// The actor the signal was raised for, if any.
    pub sender: Option<ActorId>,
    /// The context variable bag attached at raise time, if any.
    pub context: Option<VariableCollection>,
}

/// A dispatcher mutation requested by an action mid-tick.
///
/// Actions never touch the dispatcher directly; they queue commands that
/// the dispatcher applies at a safe point in its own tick.
#[derive(Debug, Clone)]
pub(crate) enum DispatcherCommand {
    /// Raise a new signal (visible from the next tick's drain).
    Raise {
        name: String,
        sender: Option<ActorId>,
        context: Option<VariableCollection>,
    },
    /// Cancel matching instances and queued signals. `None` filters are
    /// wildcards; `exclude` protects the issuing instance.
    Cancel {
        name: Option<String>,
        actor: Option<ActorId>,
        exclude: Option<InstanceId>,
    },
}

/// The per-tick environment the dispatcher lends to an advancing
/// instance.
pub(crate) struct AdvanceEnv<'a> {
    pub now: f64,
    pub variables: &'a mut VariableStore,
    pub speech: &'a mut SpeakerScheduler,
    pub commands: &'a mut Vec<DispatcherCommand>,
    pub stats: &'a BTreeMap<String, ExecutionStats>,
    pub rng: &'a RefCell<SmallRng>,
}

/// Everything an executing action may read and mutate.
pub struct ExecutionContext<'a> {
    /// Current domain time in seconds.
    pub now: f64,
    /// The shared variable store. Writes are visible to conditions
    /// evaluated later in the same tick.
    pub variables: &'a mut VariableStore,
    /// The speaker scheduler, for dialogue actions.
    pub speech: &'a mut SpeakerScheduler,
    /// The signal this response is answering.
    pub signal: &'a SignalSnapshot,
    /// The running instance's id, used as the self-exclusion token for
    /// broad cancels.
    pub instance: InstanceId,
    /// Per-program execution statistics, read-only.
    pub stats: &'a BTreeMap<String, ExecutionStats>,
    current_actor: Option<ActorId>,
    actor_change: Option<ActorId>,
    commands: &'a mut Vec<DispatcherCommand>,
    rng: &'a RefCell<SmallRng>,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        env: &'a mut AdvanceEnv<'_>,
        signal: &'a SignalSnapshot,
        instance: InstanceId,
        current_actor: Option<ActorId>,
    ) -> Self {
        Self {
            now: env.now,
            variables: &mut *env.variables,
            speech: &mut *env.speech,
            signal,
            instance,
            stats: env.stats,
            current_actor,
            actor_change: None,
            commands: &mut *env.commands,
            rng: env.rng,
        }
    }

    /// The actor the response currently addresses. Starts as the
    /// signal's sender and may be reassigned mid-flight.
    pub const fn current_actor(&self) -> Option<ActorId> {
        self.current_actor
    }

    /// Reassign the current actor. Takes effect for everything evaluated
    /// after the current action call returns; already-spawned action
    /// instances are unaffected.
    pub const fn set_current_actor(&mut self, actor: ActorId) {
        self.current_actor = Some(actor);
        self.actor_change = Some(actor);
    }

    /// Request a new signal raise on behalf of the current actor. The
    /// signal joins the queue and is drained on the next tick, never
    /// synchronously.
    pub fn raise_signal(&mut self, name: impl Into<String>, context: Option<VariableCollection>) {
        self.commands.push(DispatcherCommand::Raise {
            name: name.into(),
            sender: self.current_actor,
            context,
        });
    }

    /// Request cancellation of matching signal processing, excluding
    /// this instance itself. `None` filters are wildcards.
    pub fn cancel_signals(&mut self, name: Option<String>, actor: Option<ActorId>) {
        self.commands.push(DispatcherCommand::Cancel {
            name,
            actor,
            exclude: Some(self.instance),
        });
    }

    /// The actor reassignment recorded during the last action call, if
    /// any. Consumed by the owning instance.
    pub(crate) const fn take_actor_change(&mut self) -> Option<ActorId> {
        self.actor_change.take()
    }

    /// A read-only view for condition evaluation against this context's
    /// state.
    pub fn condition_view(&self) -> ConditionContext<'_> {
        ConditionContext {
            now: self.now,
            variables: self.variables,
            signal: self.signal,
            current_actor: self.current_actor,
            stats: self.stats,
            rng: self.rng,
        }
    }
}

impl core::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("now", &self.now)
            .field("signal", &self.signal.id)
            .field("instance", &self.instance)
            .field("current_actor", &self.current_actor)
            .finish_non_exhaustive()
    }
}

/// Everything a condition may read. Evaluation is total and read-only.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    /// Current domain time in seconds.
    pub now: f64,
    /// The shared variable store.
    pub variables: &'a VariableStore,
    /// The signal being matched or answered.
    pub signal: &'a SignalSnapshot,
    /// The actor the response currently addresses.
    pub current_actor: Option<ActorId>,
    /// Per-program execution statistics.
    pub stats: &'a BTreeMap<String, ExecutionStats>,
    /// The dispatcher's seeded RNG, shared across the tick so
    /// probabilistic conditions and tie-breaks stay reproducible.
    pub rng: &'a RefCell<SmallRng>,
}

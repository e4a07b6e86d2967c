//! The response dispatcher: signal queue, instance lifecycle, listeners.
//!
//! Raising a signal only enqueues it; everything observable happens
//! inside [`ResponseDispatcher::tick`]. Signals raised while the tick is
//! advancing instances land in the fresh queue and are drained on the
//! *next* tick, which keeps a response that re-raises its own signal from
//! exploding recursively within one frame.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use riposte_speech::SpeakerScheduler;
use riposte_types::{ActorId, InstanceId, ListenerId, SignalId};
use riposte_vars::{VariableCollection, VariableStore};

use crate::context::{AdvanceEnv, ConditionContext, DispatcherCommand, SignalSnapshot};
use crate::instance::{InstanceState, ResponseInstance};
use crate::library::ResponseLibrary;
use crate::segment::ResponseProgram;

/// Per-program execution bookkeeping, persisted across save/load so
/// execution-count and time-since conditions stay meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionStats {
    /// How often the program has started, including the start currently
    /// being evaluated.
    pub executions: u64,
    /// Domain time of the most recent start.
    pub last_start: Option<f64>,
    /// Domain time of the most recent finish or cancellation.
    pub last_end: Option<f64>,
}

/// What happened to a raised signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEventKind {
    /// A response instance was created and started.
    Started {
        /// The created instance.
        instance: InstanceId,
    },
    /// A program exists but its root conditions failed. Terminal.
    ConditionsNotMet,
    /// No program is bound to the signal name. Terminal.
    NoResponseDefined,
    /// The response ran to completion. Terminal.
    Finished,
    /// The response was canceled. Terminal.
    Canceled,
}

impl SignalEventKind {
    /// Whether this event ends the signal's processing.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Started { .. })
    }
}

/// A signal-processing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEvent {
    /// The signal concerned.
    pub signal: SignalId,
    /// The signal's name.
    pub name: String,
    /// What happened.
    pub kind: SignalEventKind,
}

/// Observer of signal-processing outcomes.
pub trait SignalListener {
    /// Called for every matching signal event.
    fn on_signal_event(&self, event: &SignalEvent);
}

impl<F> SignalListener for F
where
    F: Fn(&SignalEvent),
{
    fn on_signal_event(&self, event: &SignalEvent) {
        self(event);
    }
}

struct ListenerEntry {
    id: ListenerId,
    filter: Option<SignalId>,
    listener: Box<dyn SignalListener>,
}

/// Owns the signal queue, the response library, and every running
/// response instance.
pub struct ResponseDispatcher {
    library: ResponseLibrary,
    queue: Vec<SignalSnapshot>,
    instances: BTreeMap<InstanceId, ResponseInstance>,
    stats: BTreeMap<String, ExecutionStats>,
    listeners: Vec<ListenerEntry>,
    next_listener: u64,
    next_signal: u64,
    next_instance: u64,
    rng: RefCell<SmallRng>,
}

impl ResponseDispatcher {
    /// Create a dispatcher with an empty library. The seed drives the
    /// segment tie-break RNG for reproducible runs.
    pub fn new(seed: u64) -> Self {
        Self {
            library: ResponseLibrary::new(),
            queue: Vec::new(),
            instances: BTreeMap::new(),
            stats: BTreeMap::new(),
            listeners: Vec::new(),
            next_listener: 0,
            next_signal: 0,
            next_instance: 0,
            rng: RefCell::new(SmallRng::seed_from_u64(seed)),
        }
    }

    // -----------------------------------------------------------------------
    // Library management
    // -----------------------------------------------------------------------

    /// The installed response programs.
    pub const fn library(&self) -> &ResponseLibrary {
        &self.library
    }

    /// Install or replace the program for a signal name. Running
    /// instances of that signal are force-canceled first so no instance
    /// walks a tree that is being replaced.
    pub fn reload_program(&mut self, signal: impl Into<String>, program: ResponseProgram) {
        let signal = signal.into();
        if self.cancel_running_for(&signal) {
            warn!(%signal, "Program reloaded while instances ran, canceled them");
        }
        self.library.insert(signal, program);
    }

    /// Remove the program for a signal name, canceling its running
    /// instances. Returns whether a program was installed.
    pub fn remove_program(&mut self, signal: &str) -> bool {
        self.cancel_running_for(signal);
        self.library.remove(signal).is_some()
    }

    fn cancel_running_for(&mut self, signal: &str) -> bool {
        let mut matched = false;
        for instance in self.instances.values_mut() {
            if instance.signal().name == signal && !instance.state().is_terminal() {
                instance.request_cancel();
                matched = true;
            }
        }
        matched
    }

    // -----------------------------------------------------------------------
    // Signals
    // -----------------------------------------------------------------------

    /// Raise a signal. Only enqueues; processing happens on the next
    /// tick's drain, never synchronously. Returns the signal id for
    /// listener attachment.
    pub fn raise_signal(
        &mut self,
        name: impl Into<String>,
        sender: Option<ActorId>,
        context: Option<VariableCollection>,
    ) -> SignalId {
        let id = SignalId::new(self.next_signal);
        self.next_signal = self.next_signal.wrapping_add(1);
        let name = name.into();
        debug!(signal = %name, %id, ?sender, "Signal raised");
        self.queue.push(SignalSnapshot {
            id,
            name,
            sender,
            context,
        });
        id
    }

    /// Cancel matching running instances and remove matching queued
    /// signals. `None` filters are wildcards; `exclude` protects one
    /// instance from a broad cancel. Returns whether anything matched.
    pub fn cancel_signal_processing(
        &mut self,
        name: Option<&str>,
        actor: Option<ActorId>,
        exclude: Option<InstanceId>,
    ) -> bool {
        self.apply_cancel(name, actor, exclude, None)
    }

    /// Request cancellation of one instance. An id the dispatcher does
    /// not own is a misuse: logged as an error and ignored.
    pub fn release_instance(&mut self, id: InstanceId) {
        match self.instances.get_mut(&id) {
            Some(instance) => instance.request_cancel(),
            None => error!(instance = %id, "Release of unknown response instance ignored"),
        }
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Register a signal listener, optionally filtered to one signal id.
    /// Filtered listeners are removed automatically once their signal
    /// reaches a terminal event.
    pub fn add_listener(
        &mut self,
        filter: Option<SignalId>,
        listener: Box<dyn SignalListener>,
    ) -> ListenerId {
        let id = ListenerId::new(self.next_listener);
        self.next_listener = self.next_listener.wrapping_add(1);
        self.listeners.push(ListenerEntry {
            id,
            filter,
            listener,
        });
        id
    }

    /// Remove a listener by token. Returns whether it was registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|entry| entry.id != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, signal: SignalId, name: &str, kind: SignalEventKind) {
        let event = SignalEvent {
            signal,
            name: name.to_owned(),
            kind,
        };
        for entry in &self.listeners {
            if entry.filter.is_none_or(|filter| filter == signal) {
                entry.listener.on_signal_event(&event);
            }
        }
        if kind.is_terminal() {
            self.listeners.retain(|entry| entry.filter != Some(signal));
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Run one dispatch pass at the given domain time.
    ///
    /// Order: advance running instances (collecting their deferred
    /// dispatcher commands), apply the commands, process the signals
    /// that were queued before this tick, then clean up terminal
    /// instances. Signals raised at any point during the pass are
    /// processed on the next tick.
    pub fn tick(&mut self, now: f64, variables: &mut VariableStore, speech: &mut SpeakerScheduler) {
        let mut snapshot = core::mem::take(&mut self.queue);
        let mut commands: Vec<DispatcherCommand> = Vec::new();

        self.advance_instances(now, variables, speech, &mut commands);
        self.apply_commands(&mut commands, Some(&mut snapshot));
        self.process_queued(snapshot, now, variables, speech, &mut commands);
        self.apply_commands(&mut commands, None);
        self.cleanup_terminal(now);
    }

    fn advance_instances(
        &mut self,
        now: f64,
        variables: &mut VariableStore,
        speech: &mut SpeakerScheduler,
        commands: &mut Vec<DispatcherCommand>,
    ) {
        let ids: Vec<InstanceId> = self.instances.keys().copied().collect();
        for id in ids {
            let Some(instance) = self.instances.get_mut(&id) else {
                continue;
            };
            let program = self.library.get(instance.signal().name.as_str());
            let mut env = AdvanceEnv {
                now,
                variables: &mut *variables,
                speech: &mut *speech,
                commands: &mut *commands,
                stats: &self.stats,
                rng: &self.rng,
            };
            instance.advance(program, &mut env);
        }
    }

    fn apply_commands(
        &mut self,
        commands: &mut Vec<DispatcherCommand>,
        mut snapshot: Option<&mut Vec<SignalSnapshot>>,
    ) {
        for command in commands.drain(..) {
            match command {
                DispatcherCommand::Raise {
                    name,
                    sender,
                    context,
                } => {
                    // Lands in the fresh queue: next tick's drain.
                    self.raise_signal(name, sender, context);
                }
                DispatcherCommand::Cancel {
                    name,
                    actor,
                    exclude,
                } => {
                    self.apply_cancel(name.as_deref(), actor, exclude, snapshot.as_deref_mut());
                }
            }
        }
    }

    fn apply_cancel(
        &mut self,
        name: Option<&str>,
        actor: Option<ActorId>,
        exclude: Option<InstanceId>,
        snapshot: Option<&mut Vec<SignalSnapshot>>,
    ) -> bool {
        let mut matched = false;

        for (&id, instance) in &mut self.instances {
            if exclude == Some(id) || instance.state().is_terminal() {
                continue;
            }
            let signal = instance.signal();
            if name.is_none_or(|filter| signal.name == filter)
                && actor.is_none_or(|filter| signal.sender == Some(filter))
            {
                instance.request_cancel();
                matched = true;
            }
        }

        let mut removed: Vec<SignalSnapshot> = Vec::new();
        let mut drain_queue = |queue: &mut Vec<SignalSnapshot>| {
            queue.retain(|signal| {
                let hit = name.is_none_or(|filter| signal.name == filter)
                    && actor.is_none_or(|filter| signal.sender == Some(filter));
                if hit {
                    removed.push(signal.clone());
                }
                !hit
            });
        };
        drain_queue(&mut self.queue);
        if let Some(snapshot) = snapshot {
            drain_queue(snapshot);
        }
        for signal in removed {
            matched = true;
            debug!(signal = %signal.name, id = %signal.id, "Queued signal canceled");
            self.notify(signal.id, &signal.name, SignalEventKind::Canceled);
        }

        matched
    }

    fn process_queued(
        &mut self,
        snapshot: Vec<SignalSnapshot>,
        now: f64,
        variables: &mut VariableStore,
        speech: &mut SpeakerScheduler,
        commands: &mut Vec<DispatcherCommand>,
    ) {
        for signal in snapshot {
            let name = signal.name.clone();
            let signal_id = signal.id;

            let Some(program) = self.library.get(&name) else {
                debug!(signal = %name, "No response defined");
                self.notify(signal_id, &name, SignalEventKind::NoResponseDefined);
                continue;
            };
            let root_id = program.root();

            // Speculative start: the counter includes the execution being
            // evaluated, so an execution-limit condition on the root sees
            // its own run. Rolled back when the conditions fail.
            {
                let entry = self.stats.entry(name.clone()).or_default();
                entry.executions = entry.executions.saturating_add(1);
            }
            let met = {
                let ctx = ConditionContext {
                    now,
                    variables: &*variables,
                    signal: &signal,
                    current_actor: signal.sender,
                    stats: &self.stats,
                    rng: &self.rng,
                };
                self.library
                    .get(&name)
                    .and_then(|program| program.segment(root_id))
                    .is_some_and(|root| root.conditions.is_met(&ctx))
            };
            if !met {
                if let Some(entry) = self.stats.get_mut(&name) {
                    entry.executions = entry.executions.saturating_sub(1);
                }
                debug!(signal = %name, "Root conditions not met");
                self.notify(signal_id, &name, SignalEventKind::ConditionsNotMet);
                continue;
            }

            if let Some(entry) = self.stats.get_mut(&name) {
                entry.last_start = Some(now);
            }
            let id = InstanceId::new(self.next_instance);
            self.next_instance = self.next_instance.wrapping_add(1);
            let mut instance = ResponseInstance::new(id, Arc::new(signal), root_id);
            {
                let program = self.library.get(&name);
                let mut env = AdvanceEnv {
                    now,
                    variables: &mut *variables,
                    speech: &mut *speech,
                    commands: &mut *commands,
                    stats: &self.stats,
                    rng: &self.rng,
                };
                // First advance enters the root and runs its actions.
                instance.advance(program, &mut env);
            }
            info!(signal = %name, instance = %id, "Response started");
            self.instances.insert(id, instance);
            self.notify(signal_id, &name, SignalEventKind::Started { instance: id });
        }
    }

    fn cleanup_terminal(&mut self, now: f64) {
        let done: Vec<InstanceId> = self
            .instances
            .iter()
            .filter(|(_, instance)| instance.state().is_terminal())
            .map(|(id, _)| *id)
            .collect();
        for id in done {
            let Some(instance) = self.instances.remove(&id) else {
                continue;
            };
            let name = instance.signal().name.clone();
            let signal_id = instance.signal().id;
            let entry = self.stats.entry(name.clone()).or_default();
            entry.last_end = Some(now);
            let kind = if instance.state() == InstanceState::Canceled {
                SignalEventKind::Canceled
            } else {
                SignalEventKind::Finished
            };
            info!(signal = %name, instance = %id, ?kind, "Response ended");
            self.notify(signal_id, &name, kind);
        }
    }

    // -----------------------------------------------------------------------
    // Introspection and persistence
    // -----------------------------------------------------------------------

    /// Number of running response instances.
    pub fn running_instances(&self) -> usize {
        self.instances.len()
    }

    /// The lifecycle state of a running instance, if the dispatcher
    /// still owns it.
    pub fn instance_state(&self, id: InstanceId) -> Option<InstanceState> {
        self.instances.get(&id).map(ResponseInstance::state)
    }

    /// Signals waiting for the next tick's drain.
    pub fn queued_signals(&self) -> &[SignalSnapshot] {
        &self.queue
    }

    /// Per-program execution statistics.
    pub const fn stats(&self) -> &BTreeMap<String, ExecutionStats> {
        &self.stats
    }

    /// Export the execution statistics as an opaque JSON blob for
    /// persistence.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::to_value(&self.stats).unwrap_or_default()
    }

    /// Replace the execution statistics from a previously exported blob.
    pub fn import_stats(&mut self, blob: &serde_json::Value) -> Result<(), serde_json::Error> {
        self.stats = serde_json::from_value(blob.clone())?;
        Ok(())
    }
}

impl core::fmt::Debug for ResponseDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResponseDispatcher")
            .field("programs", &self.library.len())
            .field("queued", &self.queue.len())
            .field("instances", &self.instances.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

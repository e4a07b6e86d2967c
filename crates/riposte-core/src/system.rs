//! The top-level engine owner.
//!
//! [`DialogueSystem`] wires the clock, the variable store, the response
//! dispatcher, and the speaker scheduler together once at startup and
//! drives them in a fixed order every tick. There is no ambient global
//! state; everything reaches its collaborators through this owner.

use std::sync::Arc;

use riposte_dialogue::LineProvider;
use riposte_speech::SpeakerScheduler;
use riposte_types::{ActorId, SignalId};
use riposte_vars::{VariableCollection, VariableStore};

use crate::clock::DialogueClock;
use crate::config::RiposteConfig;
use crate::dispatcher::ResponseDispatcher;

/// The assembled dialogue response engine.
#[derive(Debug)]
pub struct DialogueSystem {
    clock: DialogueClock,
    variables: VariableStore,
    dispatcher: ResponseDispatcher,
    speech: SpeakerScheduler,
}

impl DialogueSystem {
    /// Assemble an engine over the given line provider.
    pub fn new(config: RiposteConfig, lines: Arc<dyn LineProvider>) -> Self {
        Self {
            clock: DialogueClock::new(),
            variables: VariableStore::new(),
            dispatcher: ResponseDispatcher::new(config.dispatcher.seed),
            speech: SpeakerScheduler::new(config.speech, lines),
        }
    }

    /// Advance the whole engine by one frame delta in seconds.
    ///
    /// Order matters: the clock moves first, expired variable cooldowns
    /// revert, the dispatcher drains and advances responses, and the
    /// speaker scheduler resolves line completions last.
    pub fn tick(&mut self, delta: f32) {
        let now = self.clock.advance(delta);
        self.variables.update(now);
        self.dispatcher
            .tick(now, &mut self.variables, &mut self.speech);
        self.speech.update(now);
    }

    /// Raise a signal for processing on the next tick.
    pub fn raise_signal(
        &mut self,
        name: impl Into<String>,
        sender: Option<ActorId>,
        context: Option<VariableCollection>,
    ) -> SignalId {
        self.dispatcher.raise_signal(name, sender, context)
    }

    /// Current domain time in seconds.
    pub const fn now(&self) -> f64 {
        self.clock.now()
    }

    /// The domain clock.
    pub const fn clock(&self) -> &DialogueClock {
        &self.clock
    }

    /// The shared variable store.
    pub const fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// The shared variable store, mutably.
    pub const fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    /// The response dispatcher.
    pub const fn dispatcher(&self) -> &ResponseDispatcher {
        &self.dispatcher
    }

    /// The response dispatcher, mutably.
    pub const fn dispatcher_mut(&mut self) -> &mut ResponseDispatcher {
        &mut self.dispatcher
    }

    /// The speaker scheduler.
    pub const fn speech(&self) -> &SpeakerScheduler {
        &self.speech
    }

    /// The speaker scheduler, mutably.
    pub const fn speech_mut(&mut self) -> &mut SpeakerScheduler {
        &mut self.speech
    }
}

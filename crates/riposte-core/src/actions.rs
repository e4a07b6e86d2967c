//! Built-in actions and conditions.
//!
//! These cover the standard response vocabulary: speaking a line,
//! writing variables (with optional cooldown), reassigning the current
//! actor, raising and canceling signals, waiting, and the common
//! condition checks. All are constructed through the registry from
//! definition-file parameters; embedders register further plugins
//! alongside them.

use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use riposte_speech::{LineActivity, SpeakOutcome};
use riposte_types::{ActorId, LineId, Value};

use crate::context::{ConditionContext, ExecutionContext};
use crate::registry::{
    ActionInstance, ActionState, ResponseAction, ResponseCondition, ResponseRegistry,
    typed_action, typed_condition,
};

/// Register the built-in actions and conditions under their type keys.
pub(crate) fn register_builtins(registry: &mut ResponseRegistry) {
    typed_action::<SpeakLineAction>(registry, "speak_line");
    typed_action::<SetVariableAction>(registry, "set_variable");
    typed_action::<SetActorAction>(registry, "set_actor");
    typed_action::<SendSignalAction>(registry, "send_signal");
    typed_action::<CancelSignalAction>(registry, "cancel_signal");
    typed_action::<WaitAction>(registry, "wait");

    typed_condition::<VariableCheckCondition>(registry, "variable");
    typed_condition::<ExecutionLimitCondition>(registry, "execution_limit");
    typed_condition::<TimeSinceCondition>(registry, "time_since");
    typed_condition::<RandomCondition>(registry, "random");
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Speaks a dialogue line through the speaker scheduler and blocks the
/// response until the line leaves the actor's slot and queue.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeakLineAction {
    /// The line set to speak.
    pub line: String,
}

impl ResponseAction for SpeakLineAction {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Option<Box<dyn ActionInstance>> {
        let Some(actor) = ctx.current_actor() else {
            warn!(line = %self.line, "Speak action without a current actor, skipped");
            return None;
        };
        let line = LineId::from(self.line.as_str());
        let outcome = ctx.speech.start_speaking(actor, &line, ctx.now);
        match outcome {
            SpeakOutcome::Started | SpeakOutcome::Queued => {
                Some(Box::new(SpeakLineInstance { actor, line }))
            }
            // Reported to speech listeners already; nothing to track.
            SpeakOutcome::Skipped(reason) => {
                debug!(line = %self.line, ?reason, "Speak action skipped");
                None
            }
        }
    }
}

/// Tracks a started or queued line until it leaves the scheduler.
#[derive(Debug)]
struct SpeakLineInstance {
    actor: ActorId,
    line: LineId,
}

impl ActionInstance for SpeakLineInstance {
    fn poll(&mut self, ctx: &mut ExecutionContext<'_>) -> ActionState {
        match ctx.speech.line_activity(self.actor, &self.line) {
            LineActivity::Active | LineActivity::Queued => ActionState::Running,
            LineActivity::Inactive => ActionState::Finished,
        }
    }

    fn cancel(&mut self, ctx: &mut ExecutionContext<'_>) -> ActionState {
        ctx.speech
            .cancel_speaking(Some(self.actor), -1, Some(&self.line), true);
        ActionState::Canceled
    }
}

/// Writes a variable, optionally with a timed auto-revert.
#[derive(Debug, Clone, Deserialize)]
pub struct SetVariableAction {
    /// Target collection name.
    pub collection: String,
    /// Target variable name.
    pub variable: String,
    /// The value to write.
    pub value: Value,
    /// Whether to create the variable when missing.
    #[serde(default = "default_true")]
    pub create_if_missing: bool,
    /// Cooldown in seconds; the pre-write value is restored afterwards.
    #[serde(default)]
    pub cooldown: Option<f32>,
}

impl ResponseAction for SetVariableAction {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Option<Box<dyn ActionInstance>> {
        ctx.variables.set_value(
            &self.collection,
            &self.variable,
            self.value.clone(),
            self.create_if_missing,
            self.cooldown,
            ctx.now,
        );
        None
    }
}

/// Reassigns the response's current actor for everything that follows.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SetActorAction {
    /// Handle of the actor to address from now on.
    pub actor: u64,
}

impl ResponseAction for SetActorAction {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Option<Box<dyn ActionInstance>> {
        ctx.set_current_actor(ActorId::new(self.actor));
        None
    }
}

/// Raises another signal on behalf of the current actor. The raise is
/// queued and drains on the next tick.
#[derive(Debug, Clone, Deserialize)]
pub struct SendSignalAction {
    /// Name of the signal to raise.
    pub signal: String,
    /// Whether to pass the originating signal's context bag along.
    #[serde(default)]
    pub copy_context: bool,
}

impl ResponseAction for SendSignalAction {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Option<Box<dyn ActionInstance>> {
        let context = if self.copy_context {
            ctx.signal.context.clone()
        } else {
            None
        };
        ctx.raise_signal(self.signal.clone(), context);
        None
    }
}

/// Cancels matching signal processing, excluding the issuing response
/// itself so a broad cancel never self-terminates.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelSignalAction {
    /// Only cancel this signal name; unset cancels every name.
    #[serde(default)]
    pub signal: Option<String>,
    /// Restrict the cancel to the current actor's signals.
    #[serde(default)]
    pub current_actor_only: bool,
}

impl ResponseAction for CancelSignalAction {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Option<Box<dyn ActionInstance>> {
        let actor = if self.current_actor_only {
            ctx.current_actor()
        } else {
            None
        };
        ctx.cancel_signals(self.signal.clone(), actor);
        None
    }
}

/// Blocks the response for a fixed duration of domain time.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WaitAction {
    /// Seconds to wait.
    pub seconds: f32,
}

impl ResponseAction for WaitAction {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Option<Box<dyn ActionInstance>> {
        Some(Box::new(WaitInstance {
            until: ctx.now + f64::from(self.seconds.max(0.0)),
        }))
    }
}

#[derive(Debug)]
struct WaitInstance {
    until: f64,
}

impl ActionInstance for WaitInstance {
    fn poll(&mut self, ctx: &mut ExecutionContext<'_>) -> ActionState {
        if ctx.now >= self.until {
            ActionState::Finished
        } else {
            ActionState::Running
        }
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Comparison operator for [`VariableCheckCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Values are equal.
    Equal,
    /// Values differ.
    NotEqual,
    /// Stored value is greater than the reference.
    Greater,
    /// Stored value is greater than or equal to the reference.
    GreaterOrEqual,
    /// Stored value is less than the reference.
    Less,
    /// Stored value is less than or equal to the reference.
    LessOrEqual,
}

/// Compares a stored variable against a reference value. A missing
/// variable or collection is "undefined" and never satisfies the check.
#[derive(Debug, Clone, Deserialize)]
pub struct VariableCheckCondition {
    /// Collection to read from.
    pub collection: String,
    /// Variable to read.
    pub variable: String,
    /// Comparison to apply.
    pub operator: CompareOp,
    /// Reference value.
    pub value: Value,
}

impl ResponseCondition for VariableCheckCondition {
    fn is_met(&self, ctx: &ConditionContext<'_>) -> bool {
        let Some(stored) = ctx.variables.get_value(&self.collection, &self.variable) else {
            return false;
        };
        let Some(ordering) = stored.compare(&self.value) else {
            warn!(
                collection = %self.collection,
                variable = %self.variable,
                "Variable check across incomparable kinds, treating as not met"
            );
            return false;
        };
        match self.operator {
            CompareOp::Equal => ordering.is_eq(),
            CompareOp::NotEqual => ordering.is_ne(),
            CompareOp::Greater => ordering.is_gt(),
            CompareOp::GreaterOrEqual => ordering.is_ge(),
            CompareOp::Less => ordering.is_lt(),
            CompareOp::LessOrEqual => ordering.is_le(),
        }
    }
}

/// Bounds how often a program may run. The counter includes the
/// execution currently being evaluated.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionLimitCondition {
    /// Program to inspect; defaults to the instance's own program.
    #[serde(default)]
    pub program: Option<String>,
    /// Minimum executions required.
    #[serde(default)]
    pub min: u64,
    /// Maximum executions allowed; unset means unbounded.
    #[serde(default)]
    pub max: Option<u64>,
}

impl ResponseCondition for ExecutionLimitCondition {
    fn is_met(&self, ctx: &ConditionContext<'_>) -> bool {
        let name = self.program.as_deref().unwrap_or(&ctx.signal.name);
        let executions = ctx.stats.get(name).map_or(0, |stats| stats.executions);
        executions >= self.min && self.max.is_none_or(|max| executions <= max)
    }
}

/// Requires a minimum elapsed time since a program last finished. A
/// program that never finished passes.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeSinceCondition {
    /// Program to inspect; defaults to the instance's own program.
    #[serde(default)]
    pub program: Option<String>,
    /// Required elapsed domain time in seconds.
    pub seconds: f32,
}

impl ResponseCondition for TimeSinceCondition {
    fn is_met(&self, ctx: &ConditionContext<'_>) -> bool {
        let name = self.program.as_deref().unwrap_or(&ctx.signal.name);
        ctx.stats
            .get(name)
            .and_then(|stats| stats.last_end)
            .is_none_or(|last_end| ctx.now - last_end >= f64::from(self.seconds))
    }
}

/// Passes with a fixed percent chance per evaluation. Draws from the
/// dispatcher's seeded RNG, so runs with the same seed reproduce.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RandomCondition {
    /// Chance in percent, 0 to 100.
    pub chance: f32,
}

impl ResponseCondition for RandomCondition {
    fn is_met(&self, ctx: &ConditionContext<'_>) -> bool {
        if self.chance >= 100.0 {
            return true;
        }
        if self.chance <= 0.0 {
            return false;
        }
        ctx.rng.borrow_mut().random_range(0.0..100.0) < self.chance
    }
}

const fn default_true() -> bool {
    true
}

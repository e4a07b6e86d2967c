//! The plugin registry: string-keyed action and condition factories.
//!
//! The dispatcher and the segment tree only ever hold the abstract
//! [`ResponseAction`] / [`ResponseCondition`] traits; concrete types are
//! produced by factories registered under a type key and parameterized by
//! an opaque JSON value. Program definition files name plugins by that
//! key, so embedders extend the vocabulary without touching the core.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::{ConditionContext, ExecutionContext};

/// State reported by an action instance when polled or canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    /// Still running; blocks the owning instance from descending.
    Running,
    /// Still running but does not block descent.
    RunningNonBlocking,
    /// Done; the instance drops the handle.
    Finished,
    /// Canceled; the instance drops the handle.
    Canceled,
}

/// One executable response action.
///
/// Returning `None` from [`execute`](Self::execute) means the action was
/// instantaneous and is already finished; otherwise the returned
/// instance is polled every tick until it reports a terminal state.
pub trait ResponseAction: core::fmt::Debug {
    /// Run the action. May mutate variables, drive the scheduler, or
    /// queue dispatcher commands through the context.
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Option<Box<dyn ActionInstance>>;
}

/// The running handle of a non-instantaneous action.
pub trait ActionInstance: core::fmt::Debug {
    /// Poll once per tick until a terminal state is returned.
    fn poll(&mut self, ctx: &mut ExecutionContext<'_>) -> ActionState;

    /// Force-cancel the action. Best-effort and idempotent.
    fn cancel(&mut self, _ctx: &mut ExecutionContext<'_>) -> ActionState {
        ActionState::Canceled
    }
}

/// One boolean response condition. Evaluation is total; missing data
/// degrades to `false`, never an error.
pub trait ResponseCondition: core::fmt::Debug {
    /// Whether the condition holds right now.
    fn is_met(&self, ctx: &ConditionContext<'_>) -> bool;
}

/// Errors produced when constructing plugins from definitions.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No factory is registered under the requested type key.
    #[error("unknown {kind} type '{key}'")]
    UnknownType {
        /// Either `"action"` or `"condition"`.
        kind: &'static str,
        /// The unrecognized type key.
        key: String,
    },

    /// The factory rejected the parameter payload.
    #[error("invalid parameters for {kind} '{key}': {source}")]
    InvalidParams {
        /// Either `"action"` or `"condition"`.
        kind: &'static str,
        /// The plugin type key.
        key: String,
        /// The underlying deserialization error.
        source: serde_json::Error,
    },
}

type ActionFactory = Box<dyn Fn(&serde_json::Value) -> Result<Arc<dyn ResponseAction>, RegistryError>>;
type ConditionFactory =
    Box<dyn Fn(&serde_json::Value) -> Result<Arc<dyn ResponseCondition>, RegistryError>>;

/// Factories for actions and conditions, keyed by type name.
#[derive(Default)]
pub struct ResponseRegistry {
    actions: BTreeMap<String, ActionFactory>,
    conditions: BTreeMap<String, ConditionFactory>,
}

impl ResponseRegistry {
    /// An empty registry.
    pub const fn new() -> Self {
        Self {
            actions: BTreeMap::new(),
            conditions: BTreeMap::new(),
        }
    }

    /// A registry preloaded with the built-in action and condition set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::actions::register_builtins(&mut registry);
        registry
    }

    /// Register an action factory under a type key. Replaces any
    /// previous factory for the same key.
    pub fn register_action<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn ResponseAction>, RegistryError> + 'static,
    {
        self.actions.insert(key.into(), Box::new(factory));
    }

    /// Register a condition factory under a type key.
    pub fn register_condition<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn ResponseCondition>, RegistryError> + 'static,
    {
        self.conditions.insert(key.into(), Box::new(factory));
    }

    /// Construct an action from its type key and parameter payload.
    pub fn create_action(
        &self,
        key: &str,
        params: &serde_json::Value,
    ) -> Result<Arc<dyn ResponseAction>, RegistryError> {
        let factory = self.actions.get(key).ok_or_else(|| RegistryError::UnknownType {
            kind: "action",
            key: key.to_owned(),
        })?;
        factory(params)
    }

    /// Construct a condition from its type key and parameter payload.
    pub fn create_condition(
        &self,
        key: &str,
        params: &serde_json::Value,
    ) -> Result<Arc<dyn ResponseCondition>, RegistryError> {
        let factory = self
            .conditions
            .get(key)
            .ok_or_else(|| RegistryError::UnknownType {
                kind: "condition",
                key: key.to_owned(),
            })?;
        factory(params)
    }
}

impl core::fmt::Debug for ResponseRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResponseRegistry")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("conditions", &self.conditions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Register a factory that deserializes `T` from the parameter payload.
pub(crate) fn typed_action<T>(registry: &mut ResponseRegistry, key: &'static str)
where
    T: ResponseAction + serde::de::DeserializeOwned + 'static,
{
    registry.register_action(key, move |params| {
        let action: T = serde_json::from_value(params.clone()).map_err(|source| {
            RegistryError::InvalidParams {
                kind: "action",
                key: key.to_owned(),
                source,
            }
        })?;
        Ok(Arc::new(action))
    });
}

/// Register a factory that deserializes `T` from the parameter payload.
pub(crate) fn typed_condition<T>(registry: &mut ResponseRegistry, key: &'static str)
where
    T: ResponseCondition + serde::de::DeserializeOwned + 'static,
{
    registry.register_condition(key, move |params| {
        let condition: T = serde_json::from_value(params.clone()).map_err(|source| {
            RegistryError::InvalidParams {
                kind: "condition",
                key: key.to_owned(),
                source,
            }
        })?;
        Ok(Arc::new(condition))
    });
}

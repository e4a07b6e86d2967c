//! Core of the Riposte dialogue response engine.
//!
//! Signals raised for game actors are matched against tree-structured
//! response programs; running instances walk their segment trees one
//! descent per tick, executing registered actions gated by registered
//! conditions. A coupled speaker scheduler (see [`riposte_speech`])
//! serializes the spoken lines the responses produce.
//!
//! # Modules
//!
//! - [`system`] -- The [`DialogueSystem`] top-level owner
//! - [`dispatcher`] -- Signal queue, instance lifecycle, listeners
//! - [`instance`] -- The running response state machine
//! - [`segment`] -- Programs, segments, and child selection
//! - [`conditions`] -- Boolean condition sets on segments
//! - [`library`] -- Program storage keyed by signal name
//! - [`registry`] -- String-keyed action/condition factories
//! - [`actions`] -- The built-in action and condition set
//! - [`loader`] -- YAML program definitions
//! - [`context`] -- Execution and evaluation contexts
//! - [`clock`] -- The explicit domain clock
//! - [`config`] -- Engine configuration
//!
//! Everything is single-threaded and tick-driven: call
//! [`DialogueSystem::tick`] once per frame with the elapsed delta.

pub mod actions;
pub mod clock;
pub mod conditions;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod instance;
pub mod library;
pub mod loader;
pub mod registry;
pub mod segment;
pub mod system;

pub use clock::DialogueClock;
pub use conditions::{ConditionEntry, ConditionsCollection};
pub use config::{ConfigError, DispatcherConfig, RiposteConfig};
pub use context::{ConditionContext, ExecutionContext, SignalSnapshot};
pub use dispatcher::{
    ExecutionStats, ResponseDispatcher, SignalEvent, SignalEventKind, SignalListener,
};
pub use instance::{InstanceState, ResponseInstance};
pub use library::ResponseLibrary;
pub use loader::{LoaderError, ProgramDefinition, load_program_file, parse_program};
pub use registry::{
    ActionInstance, ActionState, RegistryError, ResponseAction, ResponseCondition,
    ResponseRegistry,
};
pub use segment::{
    ProgramBuilder, ResponseProgram, ResponseSegment, SegmentId, TimedAction,
};
pub use system::DialogueSystem;

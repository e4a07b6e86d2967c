//! Shared type definitions for the Riposte dialogue response engine.
//!
//! This crate is the single source of truth for the identifier and value
//! types used across the workspace.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe handle wrappers for actors, signals, instances,
//!   listeners, and dialogue lines
//! - [`value`] -- The typed [`Value`] stored in variable collections

pub mod ids;
pub mod value;

pub use ids::{ActorId, InstanceId, LineId, ListenerId, SignalId};
pub use value::Value;

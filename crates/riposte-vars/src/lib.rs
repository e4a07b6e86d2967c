//! Variable collections with timed auto-revert for the Riposte engine.
//!
//! Response conditions read variables; actions write them. A write may
//! carry a cooldown after which the variable reverts to its pre-cooldown
//! value on its own -- the standard way to model short-lived states such
//! as "just spotted the player" without a dedicated cleanup response.
//!
//! # Modules
//!
//! - [`collection`] -- A named variable set and its cooldown bookkeeping
//! - [`store`] -- All collections, keyed by name, shared engine-wide

pub mod collection;
pub mod store;

pub use collection::VariableCollection;
pub use store::VariableStore;

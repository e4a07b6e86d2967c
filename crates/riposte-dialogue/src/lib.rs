//! Dialogue line database and variant picking for the Riposte engine.
//!
//! # Modules
//!
//! - [`lines`] -- Authored line sets, delivery variants, and pick policies
//! - [`database`] -- The [`LineDatabase`] and the [`LineProvider`] trait
//! - [`picker`] -- Variant selection and follow-up chaining

pub mod database;
pub mod lines;
pub mod picker;

pub use database::{DialogueError, LineDatabase, LineProvider};
pub use lines::{DEFAULT_LINE_PRIORITY, LineSet, LineVariant, PickPolicy};
pub use picker::{PickState, pick_variant, successor};

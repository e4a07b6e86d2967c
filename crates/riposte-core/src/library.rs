//! The response library: one program per signal name.
//!
//! The library is plain storage; it is only ever edited through the
//! dispatcher's reload path, which force-cancels running instances of
//! the affected signal first so no instance walks a tree that is being
//! replaced under it.

use std::collections::BTreeMap;

use tracing::debug;

use crate::segment::ResponseProgram;

/// Response programs keyed by signal name.
#[derive(Debug, Clone, Default)]
pub struct ResponseLibrary {
    programs: BTreeMap<String, ResponseProgram>,
}

impl ResponseLibrary {
    /// An empty library.
    pub const fn new() -> Self {
        Self {
            programs: BTreeMap::new(),
        }
    }

    /// Insert or replace the program for a signal name. Returns the
    /// previous program, if any.
    pub fn insert(&mut self, signal: impl Into<String>, program: ResponseProgram) -> Option<ResponseProgram> {
        let signal = signal.into();
        debug!(%signal, segments = program.len(), "Response program installed");
        self.programs.insert(signal, program)
    }

    /// Remove the program for a signal name.
    pub fn remove(&mut self, signal: &str) -> Option<ResponseProgram> {
        self.programs.remove(signal)
    }

    /// The program bound to a signal name, if any.
    pub fn get(&self, signal: &str) -> Option<&ResponseProgram> {
        self.programs.get(signal)
    }

    /// Number of installed programs.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Whether the library is empty.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Iterate over signal names and their programs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResponseProgram)> {
        self.programs.iter()
    }
}

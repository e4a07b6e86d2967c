//! The line database: line sets keyed by [`LineId`].
//!
//! The database is authored offline (YAML) and immutable at runtime. The
//! scheduler consumes it through the [`LineProvider`] trait so tests and
//! embedders can substitute their own backing store.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use riposte_types::LineId;

use crate::lines::LineSet;

/// Errors that can occur when loading a line database.
#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    /// Failed to read the database file from disk.
    #[error("failed to read line database file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse line database YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for DialogueError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Read-only source of line sets, as consumed by the speaker scheduler.
pub trait LineProvider {
    /// Look up a line set by id. `None` means the line is unknown.
    fn line_set(&self, id: &LineId) -> Option<&LineSet>;
}

/// The standard in-memory line database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineDatabase {
    /// Line sets keyed by line id.
    #[serde(flatten)]
    sets: BTreeMap<LineId, LineSet>,
}

impl LineDatabase {
    /// Create an empty database.
    pub const fn new() -> Self {
        Self {
            sets: BTreeMap::new(),
        }
    }

    /// Load a database from a YAML file: a mapping of line id to line set.
    pub fn from_file(path: &Path) -> Result<Self, DialogueError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse a database from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, DialogueError> {
        let database: Self = serde_yml::from_str(yaml)?;
        debug!(lines = database.sets.len(), "Line database loaded");
        Ok(database)
    }

    /// Insert or replace a line set. Returns the previous set, if any.
    pub fn insert(&mut self, id: LineId, set: LineSet) -> Option<LineSet> {
        self.sets.insert(id, set)
    }

    /// Number of line sets in the database.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Whether the database is empty.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Iterate over all line sets.
    pub fn iter(&self) -> impl Iterator<Item = (&LineId, &LineSet)> {
        self.sets.iter()
    }
}

impl LineProvider for LineDatabase {
    fn line_set(&self, id: &LineId) -> Option<&LineSet> {
        self.sets.get(id)
    }
}

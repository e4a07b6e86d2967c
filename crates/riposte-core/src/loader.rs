//! YAML program definitions.
//!
//! Programs are authored as a nested segment tree; actions and
//! conditions are named by their registry type key with an opaque
//! parameter payload the loader never inspects. Example:
//!
//! ```yaml
//! signal: guard_greeting
//! root:
//!   name: root
//!   conditions:
//!     - type: variable
//!       params: { collection: guard, variable: alerted, operator: equal, value: false }
//!   actions:
//!     - type: speak_line
//!       params: { line: guard_greeting }
//!   children:
//!     - name: follow_up
//!       conditions:
//!         - type: random
//!           params: { chance: 50.0 }
//!       actions:
//!         - type: speak_line
//!           delay: 0.5
//!           params: { line: guard_greeting_followup }
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::registry::{RegistryError, ResponseRegistry};
use crate::segment::{ProgramBuilder, ResponseProgram, ResponseSegment, SegmentId, TimedAction};
use crate::conditions::ConditionsCollection;

/// Errors produced when loading program definitions.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// Failed to read the definition file from disk.
    #[error("failed to read program definition file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse program definition YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A plugin named in the definition could not be constructed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl From<serde_yml::Error> for LoaderError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// A whole program definition: the signal it answers and its tree.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgramDefinition {
    /// The signal name the program is bound to.
    pub signal: String,
    /// The root segment definition.
    pub root: SegmentDefinition,
}

/// One segment of a program definition.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentDefinition {
    /// Authored segment name, for logs.
    #[serde(default)]
    pub name: String,
    /// Condition entries gating descent into this segment.
    #[serde(default)]
    pub conditions: Vec<ConditionDefinition>,
    /// Whether the whole condition set is negated.
    #[serde(default)]
    pub negate_conditions: bool,
    /// Actions run on segment entry, in order.
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
    /// Child segments.
    #[serde(default)]
    pub children: Vec<SegmentDefinition>,
}

/// A condition reference by registry type key.
#[derive(Debug, Clone, Deserialize)]
pub struct ConditionDefinition {
    /// The registry type key.
    #[serde(rename = "type")]
    pub type_key: String,
    /// Whether this entry's result is inverted.
    #[serde(default)]
    pub negated: bool,
    /// Opaque parameter payload handed to the factory.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// An action reference by registry type key.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionDefinition {
    /// The registry type key.
    #[serde(rename = "type")]
    pub type_key: String,
    /// Seconds to wait after segment entry before executing.
    #[serde(default)]
    pub delay: f32,
    /// Opaque parameter payload handed to the factory.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Load and build a program definition from a YAML file. Returns the
/// signal name and the built program.
pub fn load_program_file(
    path: &Path,
    registry: &ResponseRegistry,
) -> Result<(String, ResponseProgram), LoaderError> {
    let contents = std::fs::read_to_string(path)?;
    parse_program(&contents, registry)
}

/// Parse and build a program definition from a YAML string.
pub fn parse_program(
    yaml: &str,
    registry: &ResponseRegistry,
) -> Result<(String, ResponseProgram), LoaderError> {
    let definition: ProgramDefinition = serde_yml::from_str(yaml)?;
    let program = build_program(&definition, registry)?;
    debug!(signal = %definition.signal, segments = program.len(), "Program definition built");
    Ok((definition.signal, program))
}

/// Build a [`ResponseProgram`] from an in-memory definition.
pub fn build_program(
    definition: &ProgramDefinition,
    registry: &ResponseRegistry,
) -> Result<ResponseProgram, LoaderError> {
    let mut builder = ProgramBuilder::new(build_segment(&definition.root, registry)?);
    let root = builder.root();
    attach_children(&mut builder, root, &definition.root.children, registry)?;
    Ok(builder.build())
}

fn attach_children(
    builder: &mut ProgramBuilder,
    parent: SegmentId,
    children: &[SegmentDefinition],
    registry: &ResponseRegistry,
) -> Result<(), LoaderError> {
    for child in children {
        let id = builder.add_child(parent, build_segment(child, registry)?);
        attach_children(builder, id, &child.children, registry)?;
    }
    Ok(())
}

fn build_segment(
    definition: &SegmentDefinition,
    registry: &ResponseRegistry,
) -> Result<ResponseSegment, LoaderError> {
    let mut conditions = ConditionsCollection::new();
    for entry in &definition.conditions {
        let condition = registry.create_condition(&entry.type_key, &entry.params)?;
        conditions.push(condition, entry.negated);
    }
    conditions.set_negated(definition.negate_conditions);

    let mut segment = ResponseSegment::named(definition.name.clone()).with_conditions(conditions);
    for entry in &definition.actions {
        let action = registry.create_action(&entry.type_key, &entry.params)?;
        segment = segment.with_action(TimedAction::delayed(action, entry.delay));
    }
    Ok(segment)
}

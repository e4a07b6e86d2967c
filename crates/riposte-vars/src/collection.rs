//! A named collection of typed variables with timed auto-revert.
//!
//! Writes may carry a cooldown: after the given number of domain-time
//! seconds the variable automatically reverts to the value it held before
//! the *first* timed write. A second timed write before expiry refreshes
//! the deadline but never changes the value that will be restored -- the
//! original survives any number of intermediate timed writes. A plain
//! write cancels the pending revert entirely (the writer took manual
//! control of the variable).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use riposte_types::Value;

/// Pending revert bookkeeping for one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Cooldown {
    /// The value to restore. `None` means the variable did not exist
    /// before the timed write and will be removed again on expiry.
    original: Option<Value>,
    /// Domain time at which the revert fires.
    expires_at: f64,
}

/// A named set of variables, plus the cooldown state of timed writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableCollection {
    /// Collection name, used for logging and signal context labeling.
    name: String,
    /// Current variable values.
    variables: BTreeMap<String, Value>,
    /// Pending reverts keyed by variable name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    cooldowns: BTreeMap<String, Cooldown>,
}

impl VariableCollection {
    /// Create an empty collection with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: BTreeMap::new(),
            cooldowns: BTreeMap::new(),
        }
    }

    /// Return the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a variable. A missing name yields `None` ("undefined").
    pub fn get(&self, variable: &str) -> Option<&Value> {
        self.variables.get(variable)
    }

    /// Whether the collection holds the given variable.
    pub fn contains(&self, variable: &str) -> bool {
        self.variables.contains_key(variable)
    }

    /// Number of variables currently stored.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the collection holds no variables.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Iterate over variable names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.variables.iter()
    }

    /// Write a variable, canceling any pending revert on it.
    ///
    /// Returns `false` (with a warning) when the variable does not exist
    /// and `create_if_missing` is not set; the store is left unchanged.
    pub fn set(&mut self, variable: &str, value: Value, create_if_missing: bool) -> bool {
        if !create_if_missing && !self.variables.contains_key(variable) {
            warn!(
                collection = %self.name,
                variable,
                "Write to unknown variable without create flag, ignored"
            );
            return false;
        }
        self.cooldowns.remove(variable);
        self.variables.insert(variable.to_owned(), value);
        true
    }

    /// Write a variable that reverts after `seconds` of domain time.
    ///
    /// The first timed write records the current value (or its absence) as
    /// the restore target; later timed writes before expiry only push the
    /// deadline out. A non-positive `seconds` degrades to a plain [`set`].
    ///
    /// [`set`]: VariableCollection::set
    pub fn set_with_cooldown(
        &mut self,
        variable: &str,
        value: Value,
        seconds: f32,
        create_if_missing: bool,
        now: f64,
    ) -> bool {
        if seconds <= 0.0 {
            return self.set(variable, value, create_if_missing);
        }
        if !create_if_missing && !self.variables.contains_key(variable) {
            warn!(
                collection = %self.name,
                variable,
                "Timed write to unknown variable without create flag, ignored"
            );
            return false;
        }

        let expires_at = now + f64::from(seconds);
        match self.cooldowns.get_mut(variable) {
            Some(cooldown) => {
                // Refresh the deadline only; the restore target stays the
                // value from before the first timed write.
                cooldown.expires_at = expires_at;
            }
            None => {
                let original = self.variables.get(variable).cloned();
                self.cooldowns.insert(
                    variable.to_owned(),
                    Cooldown {
                        original,
                        expires_at,
                    },
                );
            }
        }
        self.variables.insert(variable.to_owned(), value);
        true
    }

    /// Restore every variable whose cooldown deadline has passed.
    ///
    /// Called once per tick by the store with the current domain time.
    pub fn update(&mut self, now: f64) {
        let expired: Vec<String> = self
            .cooldowns
            .iter()
            .filter(|(_, cooldown)| cooldown.expires_at <= now)
            .map(|(name, _)| name.clone())
            .collect();

        for variable in expired {
            let Some(cooldown) = self.cooldowns.remove(&variable) else {
                continue;
            };
            match cooldown.original {
                Some(original) => {
                    debug!(
                        collection = %self.name,
                        variable,
                        restored = %original,
                        "Cooldown expired, variable restored"
                    );
                    self.variables.insert(variable, original);
                }
                None => {
                    debug!(
                        collection = %self.name,
                        variable,
                        "Cooldown expired, variable removed (did not exist before)"
                    );
                    self.variables.remove(&variable);
                }
            }
        }
    }
}

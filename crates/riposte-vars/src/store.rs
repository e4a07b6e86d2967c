//! The store of all variable collections shared across the engine.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use riposte_types::Value;

use crate::collection::VariableCollection;

/// All variable collections, keyed by collection name.
///
/// The store is shared by every running response instance and action;
/// writes are immediately visible to conditions evaluated later in the
/// same tick. Missing collections or variables are data-integrity
/// warnings, never errors: lookups degrade to "undefined".
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    collections: BTreeMap<String, VariableCollection>,
    /// Lookup paths already warned about, so a hot condition reading a
    /// missing variable every tick cannot flood the log.
    missing_warned: RefCell<BTreeSet<(String, String)>>,
}

impl VariableStore {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            collections: BTreeMap::new(),
            missing_warned: RefCell::new(BTreeSet::new()),
        }
    }

    /// Look up a collection by name.
    pub fn collection(&self, name: &str) -> Option<&VariableCollection> {
        self.collections.get(name)
    }

    /// Look up a collection by name, mutably.
    pub fn collection_mut(&mut self, name: &str) -> Option<&mut VariableCollection> {
        self.collections.get_mut(name)
    }

    /// Fetch a collection, creating it when absent.
    pub fn get_or_create(&mut self, name: &str) -> &mut VariableCollection {
        self.collections
            .entry(name.to_owned())
            .or_insert_with(|| VariableCollection::new(name))
    }

    /// Remove a collection entirely. Returns whether it existed.
    pub fn remove_collection(&mut self, name: &str) -> bool {
        self.collections.remove(name).is_some()
    }

    /// Number of collections in the store.
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Whether the store holds no collections.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Read a variable. Missing collection or variable yields `None` --
    /// conditions treat "undefined" as not met. The first miss per
    /// lookup path warns; repeats log at debug.
    pub fn get_value(&self, collection: &str, variable: &str) -> Option<&Value> {
        let Some(found) = self.collections.get(collection) else {
            self.note_miss(collection, variable, "Read from unknown variable collection");
            return None;
        };
        let value = found.get(variable);
        if value.is_none() {
            self.note_miss(collection, variable, "Read of undefined variable");
        }
        value
    }

    fn note_miss(&self, collection: &str, variable: &str, message: &str) {
        let first = self
            .missing_warned
            .borrow_mut()
            .insert((collection.to_owned(), variable.to_owned()));
        if first {
            warn!(collection, variable, "{message}");
        } else {
            debug!(collection, variable, "{message}");
        }
    }

    /// Write a variable, optionally with a cooldown.
    ///
    /// A `Some(seconds)` cooldown with positive `seconds` schedules an
    /// automatic revert to the pre-cooldown value; see
    /// [`VariableCollection::set_with_cooldown`]. The collection is created
    /// on demand when `create_if_missing` is set, otherwise a write to an
    /// unknown collection is ignored with a warning.
    pub fn set_value(
        &mut self,
        collection: &str,
        variable: &str,
        value: Value,
        create_if_missing: bool,
        cooldown_seconds: Option<f32>,
        now: f64,
    ) -> bool {
        let target = if create_if_missing {
            self.get_or_create(collection)
        } else {
            let Some(found) = self.collections.get_mut(collection) else {
                warn!(
                    collection,
                    variable, "Write to unknown variable collection, ignored"
                );
                return false;
            };
            found
        };
        match cooldown_seconds {
            Some(seconds) => {
                target.set_with_cooldown(variable, value, seconds, create_if_missing, now)
            }
            None => target.set(variable, value, create_if_missing),
        }
    }

    /// Advance cooldown timers in every collection.
    pub fn update(&mut self, now: f64) {
        for collection in self.collections.values_mut() {
            collection.update(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_makes_collection() {
        let mut store = VariableStore::new();
        assert!(store.is_empty());
        store.get_or_create("global").set("x", Value::Int(1), true);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_value("global", "x"), Some(&Value::Int(1)));
    }

    #[test]
    fn missing_lookups_are_undefined() {
        let store = VariableStore::new();
        assert_eq!(store.get_value("global", "x"), None);
    }

    #[test]
    fn repeated_missing_reads_record_one_warning_path() {
        let store = VariableStore::new();
        assert_eq!(store.get_value("global", "x"), None);
        assert_eq!(store.get_value("global", "x"), None);
        assert_eq!(store.get_value("global", "y"), None);
        assert_eq!(store.missing_warned.borrow().len(), 2);
    }

    #[test]
    fn set_value_without_create_on_unknown_collection_is_ignored() {
        let mut store = VariableStore::new();
        assert!(!store.set_value("global", "x", Value::Int(1), false, None, 0.0));
        assert!(store.is_empty());
    }

    #[test]
    fn update_ticks_all_collections() {
        let mut store = VariableStore::new();
        store.set_value("a", "x", Value::Int(1), true, None, 0.0);
        store.set_value("a", "x", Value::Int(2), true, Some(1.0), 0.0);
        store.set_value("b", "y", Value::Int(1), true, None, 0.0);
        store.set_value("b", "y", Value::Int(2), true, Some(2.0), 0.0);

        store.update(1.5);
        assert_eq!(store.get_value("a", "x"), Some(&Value::Int(1)));
        assert_eq!(store.get_value("b", "y"), Some(&Value::Int(2)));

        store.update(2.5);
        assert_eq!(store.get_value("b", "y"), Some(&Value::Int(1)));
    }
}

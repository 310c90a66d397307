//! Shared state: the result bag passed between stage groups.

use super::StateSnapshot;
use crate::errors::StateConflictError;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Key under which the initiating input of a run is stored.
pub const RESERVED_INPUT_KEY: &str = "topic";

/// Owner recorded for the initiating input.
pub const INPUT_OWNER: &str = "<input>";

/// Shared state as returned to the caller at the end of a run.
pub type FinalState = SharedState;

#[derive(Debug, Clone, PartialEq)]
struct StateEntry {
    value: serde_json::Value,
    owner: String,
}

/// A value produced by a stage, waiting to be merged.
#[derive(Debug, Clone, PartialEq)]
pub struct StateWrite {
    /// The producing stage.
    pub owner: String,
    /// The declared output key.
    pub key: String,
    /// The produced value.
    pub value: serde_json::Value,
}

impl StateWrite {
    /// Creates a new pending write.
    #[must_use]
    pub fn new(owner: impl Into<String>, key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            owner: owner.into(),
            key: key.into(),
            value,
        }
    }
}

/// Map of output key to value, populated monotonically over a run.
///
/// A key, once written, is only ever rewritten by the stage that produced it.
/// Entries keep merge order, so iteration and serialization are deterministic.
/// Only the executor mutates shared state; stages see [`StateSnapshot`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedState {
    entries: IndexMap<String, StateEntry>,
}

impl SharedState {
    /// Creates an empty shared state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates shared state holding the initiating input under [`RESERVED_INPUT_KEY`].
    #[must_use]
    pub fn with_input(input: serde_json::Value) -> Self {
        let mut state = Self::new();
        state.insert_input(input);
        state
    }

    /// Stores the initiating input, replacing any previous one.
    pub fn insert_input(&mut self, input: serde_json::Value) {
        self.entries.insert(
            RESERVED_INPUT_KEY.to_string(),
            StateEntry {
                value: input,
                owner: INPUT_OWNER.to_string(),
            },
        );
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the stage that produced `key`.
    #[must_use]
    pub fn owner(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|entry| entry.owner.as_str())
    }

    /// Returns keys in merge order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the state is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges a stage's output under its key.
    ///
    /// # Errors
    ///
    /// Returns `StateConflictError` if the key was produced by another stage.
    pub fn merge(
        &mut self,
        owner: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StateConflictError> {
        if let Some(existing) = self.entries.get_mut(key) {
            if existing.owner != owner {
                return Err(StateConflictError::new(key, &existing.owner, owner));
            }
            existing.value = value;
            return Ok(());
        }

        self.entries.insert(
            key.to_string(),
            StateEntry {
                value,
                owner: owner.to_string(),
            },
        );
        Ok(())
    }

    /// Merges pending writes in order, stopping at the first conflict.
    ///
    /// # Errors
    ///
    /// Returns `StateConflictError` on the first ownership violation.
    pub fn merge_all(&mut self, writes: Vec<StateWrite>) -> Result<(), StateConflictError> {
        for write in writes {
            self.merge(&write.owner, &write.key, write.value)?;
        }
        Ok(())
    }

    /// Takes an immutable snapshot of the current values.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.snapshot_with(&[])
    }

    /// Takes a snapshot that also includes `pending` writes not merged yet.
    #[must_use]
    pub fn snapshot_with(&self, pending: &[StateWrite]) -> StateSnapshot {
        let mut values: IndexMap<String, serde_json::Value> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect();
        for write in pending {
            values.insert(write.key.clone(), write.value.clone());
        }
        StateSnapshot::new(values)
    }

    /// Converts the state to a JSON object in merge order.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.value.clone()))
                .collect(),
        )
    }
}

impl Serialize for SharedState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, entry) in &self.entries {
            map.serialize_entry(key, &entry.value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_input_is_reserved() {
        let state = SharedState::with_input(json!("black holes"));
        assert_eq!(state.get(RESERVED_INPUT_KEY), Some(&json!("black holes")));
        assert_eq!(state.owner(RESERVED_INPUT_KEY), Some(INPUT_OWNER));
    }

    #[test]
    fn test_merge_rejects_foreign_owner() {
        let mut state = SharedState::with_input(json!("t"));
        state.merge("ScriptGenerator", "script_data", json!("v1")).unwrap();

        let err = state.merge("AudioNarrator", "script_data", json!("v2")).unwrap_err();
        assert_eq!(err.owner, "ScriptGenerator");
        assert_eq!(err.writer, "AudioNarrator");
        assert_eq!(state.get("script_data"), Some(&json!("v1")));

        let err = state.merge("ScriptGenerator", RESERVED_INPUT_KEY, json!("x")).unwrap_err();
        assert_eq!(err.owner, INPUT_OWNER);
    }

    #[test]
    fn test_owner_may_rewrite() {
        let mut state = SharedState::new();
        state.merge("ImageCreator", "images_data", json!([1])).unwrap();
        state.merge("ImageCreator", "images_data", json!([1, 2])).unwrap();
        assert_eq!(state.get("images_data"), Some(&json!([1, 2])));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_merge_order_is_preserved() {
        let mut state = SharedState::with_input(json!("t"));
        state
            .merge_all(vec![
                StateWrite::new("B", "b", json!(2)),
                StateWrite::new("A", "a", json!(1)),
            ])
            .unwrap();

        assert_eq!(state.keys().collect::<Vec<_>>(), vec!["topic", "b", "a"]);
        assert_eq!(
            serde_json::to_string(&state).unwrap(),
            r#"{"topic":"t","b":2,"a":1}"#
        );
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let mut state = SharedState::with_input(json!("t"));
        let snapshot = state.snapshot();
        state.merge("A", "a", json!(1)).unwrap();

        assert!(!snapshot.contains_key("a"));
        assert!(state.contains_key("a"));
    }

    #[test]
    fn test_snapshot_with_pending() {
        let state = SharedState::with_input(json!("t"));
        let snapshot = state.snapshot_with(&[StateWrite::new("A", "a", json!(1))]);
        assert_eq!(snapshot.get("a"), Some(&json!(1)));
        assert!(!state.contains_key("a"));
    }
}

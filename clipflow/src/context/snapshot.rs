//! Immutable views of shared state handed to stages.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// An immutable, cheaply cloneable view of shared state.
///
/// All members of a parallel group share one snapshot; nothing a member does
/// is visible to its siblings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    values: Arc<IndexMap<String, serde_json::Value>>,
}

impl StateSnapshot {
    /// Creates a snapshot from values.
    #[must_use]
    pub fn new(values: IndexMap<String, serde_json::Value>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for StateSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.as_ref().serialize(serializer)
    }
}

impl FromIterator<(String, serde_json::Value)> for StateSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_clone_shares_values() {
        let snapshot: StateSnapshot = [("topic".to_string(), json!("volcanoes"))].into_iter().collect();
        let copy = snapshot.clone();

        assert!(Arc::ptr_eq(&snapshot.values, &copy.values));
        assert_eq!(copy.get("topic"), Some(&json!("volcanoes")));
        assert_eq!(copy.keys().collect::<Vec<_>>(), vec!["topic"]);
    }

    #[test]
    fn test_snapshot_serializes_as_ordered_object() {
        let snapshot: StateSnapshot = [
            ("topic".to_string(), json!("volcanoes")),
            ("script_data".to_string(), json!({ "word_count": 3 })),
        ]
        .into_iter()
        .collect();

        let value = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(value, json!({ "topic": "volcanoes", "script_data": { "word_count": 3 } }));
        let rendered = serde_json::to_string(&snapshot).unwrap();
        assert!(rendered.find("topic") < rendered.find("script_data"));
    }
}

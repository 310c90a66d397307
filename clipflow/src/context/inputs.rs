//! Stage inputs with strictness enforcement.

use super::StateSnapshot;
use crate::errors::{CapabilityError, UndeclaredInputError};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;

/// The declared inputs of one stage invocation.
///
/// Reading a key the stage did not declare is an error, so a stage can never
/// depend on state it has not told the pipeline about.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    /// The state the stage runs against.
    snapshot: StateSnapshot,
    /// The declared input keys, in declaration order.
    declared: Vec<String>,
    /// Values computed by the stage itself and passed on to its capability.
    derived: IndexMap<String, serde_json::Value>,
    /// The name of the current stage (for error messages).
    stage_name: String,
}

impl StageInputs {
    /// Creates stage inputs over a snapshot.
    #[must_use]
    pub fn new(snapshot: StateSnapshot, declared: Vec<String>, stage_name: impl Into<String>) -> Self {
        Self {
            snapshot,
            declared,
            derived: IndexMap::new(),
            stage_name: stage_name.into(),
        }
    }

    /// Creates inputs where every given pair is declared. Useful for calling
    /// capabilities outside a pipeline.
    #[must_use]
    pub fn from_pairs<I, K>(stage_name: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        let values: IndexMap<String, serde_json::Value> =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let declared = values.keys().cloned().collect();
        Self::new(StateSnapshot::new(values), declared, stage_name)
    }

    /// Adds a value derived by the stage. Derived keys are always readable.
    #[must_use]
    pub fn with_derived(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.derived.insert(key.into(), value);
        self
    }

    /// Gets a declared input.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredInputError` if `key` was not declared.
    pub fn get(&self, key: &str) -> Result<Option<&serde_json::Value>, UndeclaredInputError> {
        if let Some(value) = self.derived.get(key) {
            return Ok(Some(value));
        }
        if !self.is_declared(key) {
            return Err(UndeclaredInputError::new(&self.stage_name, key));
        }
        Ok(self.snapshot.get(key))
    }

    /// Gets a declared input that must be present.
    ///
    /// # Errors
    ///
    /// Returns `CapabilityError::Undeclared` or `CapabilityError::MissingInput`.
    pub fn require(&self, key: &str) -> Result<&serde_json::Value, CapabilityError> {
        self.get(key)?
            .ok_or_else(|| CapabilityError::MissingInput(key.to_string()))
    }

    /// Gets a required input and deserializes it.
    ///
    /// # Errors
    ///
    /// Returns `CapabilityError::InvalidInput` if the value has the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, CapabilityError> {
        let value = self.require(key)?;
        serde_json::from_value(value.clone())
            .map_err(|e| CapabilityError::invalid_input(key, e.to_string()))
    }

    /// Gets a required string input.
    ///
    /// # Errors
    ///
    /// Returns `CapabilityError::InvalidInput` if the value is not a string.
    pub fn get_str(&self, key: &str) -> Result<&str, CapabilityError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| CapabilityError::invalid_input(key, "expected a string"))
    }

    /// Returns whether `key` was declared.
    #[must_use]
    pub fn is_declared(&self, key: &str) -> bool {
        self.declared.iter().any(|k| k == key)
    }

    /// Returns the declared keys.
    #[must_use]
    pub fn declared(&self) -> &[String] {
        &self.declared
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Converts the readable inputs to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for key in &self.declared {
            if let Some(value) = self.snapshot.get(key) {
                map.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in &self.derived {
            map.insert(key.clone(), value.clone());
        }
        serde_json::Value::Object(map)
    }
}

//! `StateManager` implementation with JSON Patch delta generation.

use crate::error::{StateError, StateResult};
use delta_core::{JsonValue, StateMap};
use json_patch::{Patch, PatchOperation, diff};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// A JSON Patch describing a state change (RFC 6902).
#[derive(Debug, Clone, Default)]
pub struct StatePatch(pub Patch);

impl StatePatch {
    /// Create an empty patch (no operations).
    #[must_use]
    pub fn empty() -> Self {
        Self(Patch(Vec::new()))
    }

    /// Check if this patch has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.0.is_empty()
    }

    /// Get the number of operations in this patch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.0.len()
    }

    /// Get the operations in this patch.
    #[must_use]
    pub fn operations(&self) -> &[PatchOperation] {
        &self.0.0
    }

    /// Top-level state keys touched by this patch, sorted and deduplicated.
    #[must_use]
    pub fn changed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .operations()
            .iter()
            .filter_map(|op| top_level_key(&operation_path(op)))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

impl Serialize for StatePatch {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl From<Patch> for StatePatch {
    fn from(patch: Patch) -> Self {
        Self(patch)
    }
}

fn operation_path(op: &PatchOperation) -> String {
    match op {
        PatchOperation::Add(op) => op.path.to_string(),
        PatchOperation::Remove(op) => op.path.to_string(),
        PatchOperation::Replace(op) => op.path.to_string(),
        PatchOperation::Move(op) => op.path.to_string(),
        PatchOperation::Copy(op) => op.path.to_string(),
        PatchOperation::Test(op) => op.path.to_string(),
    }
}

fn top_level_key(pointer: &str) -> Option<String> {
    let rest = pointer.strip_prefix('/')?;
    let token = rest.split('/').next()?;
    Some(token.replace("~1", "/").replace("~0", "~"))
}

/// Thread-safe component state with automatic JSON Patch delta generation.
///
/// Clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct StateManager {
    state: Arc<RwLock<StateMap>>,
}

impl StateManager {
    /// Create a new state manager with the given initial state.
    #[must_use]
    pub fn new(initial: StateMap) -> Self {
        Self {
            state: Arc::new(RwLock::new(initial)),
        }
    }

    /// Create a state manager from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotAnObject`] unless `value` is an object.
    pub fn from_value(value: JsonValue) -> StateResult<Self> {
        match value {
            JsonValue::Object(map) => Ok(Self::new(map)),
            other => Err(StateError::NotAnObject {
                found: json_type(&other),
            }),
        }
    }

    /// Read the current state without modification.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&StateMap) -> R,
    {
        let guard = self.state.read();
        f(&guard)
    }

    /// Get a clone of the current state.
    #[must_use]
    pub fn snapshot(&self) -> StateMap {
        self.state.read().clone()
    }

    /// Update state and return the JSON Patch delta.
    pub fn update<F>(&self, f: F) -> StatePatch
    where
        F: FnOnce(&mut StateMap),
    {
        let mut guard = self.state.write();
        let before = JsonValue::Object(guard.clone());
        f(&mut guard);
        let after = JsonValue::Object(guard.clone());
        StatePatch(diff(&before, &after))
    }

    /// Replace the entire state and return the delta.
    pub fn replace(&self, new_state: StateMap) -> StatePatch {
        self.update(|state| *state = new_state)
    }

    /// Set one property and return the delta.
    pub fn set_property(&self, name: &str, value: JsonValue) -> StatePatch {
        self.update(|state| {
            state.insert(name.to_owned(), value);
        })
    }
}

pub(crate) fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

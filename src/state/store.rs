// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution
//!
//! `ExecutionState` is the single mutable container a run carries through its
//! graph walk. Exactly one owner mutates it at a time; the executor threads it
//! by `&mut` through node executions and the router reads it for condition
//! evaluation. It serializes whole, so a snapshot of it is a complete
//! checkpoint payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::StateError;

use super::schema::{ReducerType, StateSchema};

/// Runtime workflow state with reducer support
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Correlation id for the run this state belongs to
    execution_id: String,
    /// Monotonic step counter, advanced by the executor at node boundaries
    step: u64,
    /// Current state values
    fields: HashMap<String, Value>,
    /// Reducers for each field
    reducers: HashMap<String, ReducerType>,
}

impl ExecutionState {
    /// Create a new ExecutionState from a schema, applying field defaults
    pub fn new(schema: &StateSchema) -> Self {
        let mut fields = HashMap::new();
        let mut reducers = HashMap::new();

        for (name, def) in &schema.fields {
            if let Some(default) = &def.default {
                fields.insert(name.clone(), default.clone());
            }
            reducers.insert(name.clone(), def.reducer.clone());
        }

        Self {
            execution_id: Uuid::new_v4().to_string(),
            step: 0,
            fields,
            reducers,
        }
    }

    /// Create an empty ExecutionState with a fresh execution id
    pub fn empty() -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            step: 0,
            fields: HashMap::new(),
            reducers: HashMap::new(),
        }
    }

    /// The correlation id of the run this state belongs to
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Current step counter
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Advance the step counter. Called by the executor at node boundaries.
    pub fn advance_step(&mut self) -> u64 {
        self.step += 1;
        self.step
    }

    /// Set a field, applying the field's reducer
    pub fn set(&mut self, key: &str, value: Value) {
        let reducer = self
            .reducers
            .get(key)
            .cloned()
            .unwrap_or(ReducerType::Overwrite);

        match reducer {
            ReducerType::Overwrite => {
                self.fields.insert(key.to_string(), value);
            }
            ReducerType::Append => {
                let arr = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Array(vec![]));
                if let Value::Array(a) = arr {
                    match value {
                        Value::Array(new_items) => a.extend(new_items),
                        other => a.push(other),
                    }
                }
            }
            ReducerType::Max => {
                let current = self.fields.get(key).and_then(|v| v.as_f64());
                if let Some(new) = value.as_f64() {
                    if current.is_none() || new > current.unwrap_or(f64::NEG_INFINITY) {
                        self.fields.insert(key.to_string(), value);
                    }
                }
            }
            ReducerType::Min => {
                let current = self.fields.get(key).and_then(|v| v.as_f64());
                if let Some(new) = value.as_f64() {
                    if current.is_none() || new < current.unwrap_or(f64::INFINITY) {
                        self.fields.insert(key.to_string(), value);
                    }
                }
            }
            ReducerType::Merge => {
                let current = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Object(Map::new()));
                if let (Value::Object(current_obj), Value::Object(new_obj)) = (current, value) {
                    for (k, v) in new_obj {
                        current_obj.insert(k, v);
                    }
                }
            }
        }
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a field value using dot notation (e.g., "result.intent").
    ///
    /// A field whose literal name contains dots (loop counters like
    /// "walk.iteration") wins over path descent into nested objects.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.fields.get(path) {
            return Some(value);
        }

        let mut parts = path.split('.');
        let first = parts.next()?;

        let mut current = self.fields.get(first)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Get a field deserialized into a concrete type.
    ///
    /// Fails with `KeyNotFound` when the key is absent and `TypeMismatch`
    /// when the stored value does not deserialize into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, StateError> {
        let value = self
            .fields
            .get(key)
            .ok_or_else(|| StateError::KeyNotFound(key.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|_| StateError::TypeMismatch {
            key: key.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Non-failing variant of [`get_as`](Self::get_as)
    pub fn try_get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.fields
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Convert state values to a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Get all field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::empty()
    }
}

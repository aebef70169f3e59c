// SPDX-License-Identifier: MIT

//! Declarative shape of workflow state
//!
//! A schema names each field, its expected type, how repeated writes fold
//! into the existing value, and an optional starting value. Workflow YAML
//! maps field names directly to definitions, so the schema deserializes as
//! a flattened map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a new write combines with the value already stored under a key
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ReducerType {
    /// Last write wins
    #[default]
    Overwrite,
    /// Push onto the existing array
    Append,
    /// Keep whichever number is larger
    Max,
    /// Keep whichever number is smaller
    Min,
    /// Recursively merge object keys
    Merge,
}

/// Value categories a field may declare
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

/// One field of the workflow state
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateFieldDef {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub reducer: ReducerType,
    /// Seeded into fresh state before the first node runs
    pub default: Option<serde_json::Value>,
}

impl StateFieldDef {
    /// A field of the given type with overwrite semantics and no default
    pub fn typed(field_type: FieldType) -> Self {
        Self {
            field_type,
            reducer: ReducerType::default(),
            default: None,
        }
    }

    pub fn with_reducer(mut self, reducer: ReducerType) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Named field definitions for one workflow's state
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StateSchema {
    #[serde(flatten)]
    pub fields: HashMap<String, StateFieldDef>,
}

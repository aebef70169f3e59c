// SPDX-License-Identifier: MIT

//! Coordinator-mediated shared state
//!
//! Agents never touch each other's execution state; anything crossing agent
//! boundaries goes through a [`SharedState`] with a declared write policy,
//! since several agents may write the same key.

use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::LatticeError;

/// What happens when a write hits a key that already holds a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    #[default]
    LastWriteWins,
    /// Object fields union, arrays append; mismatched shapes conflict
    Merge,
    /// Any differing write to an occupied key is an error
    Reject,
}

/// Cross-agent key/value store with conflict resolution
pub struct SharedState {
    policy: WritePolicy,
    values: RwLock<HashMap<String, Value>>,
}

impl SharedState {
    pub fn new(policy: WritePolicy) -> Self {
        Self {
            policy,
            values: RwLock::new(HashMap::new()),
        }
    }

    pub async fn put(
        &self,
        writer: &str,
        key: &str,
        value: Value,
    ) -> Result<(), LatticeError> {
        let mut values = self.values.write().await;

        let Some(existing) = values.get(key) else {
            values.insert(key.to_string(), value);
            return Ok(());
        };

        match self.policy {
            WritePolicy::LastWriteWins => {
                log::debug!("shared key '{}' overwritten by '{}'", key, writer);
                values.insert(key.to_string(), value);
                Ok(())
            }
            WritePolicy::Merge => {
                let merged = merge_values(existing, &value).ok_or_else(|| {
                    LatticeError::SharedStateConflict {
                        key: key.to_string(),
                    }
                })?;
                values.insert(key.to_string(), merged);
                Ok(())
            }
            WritePolicy::Reject => {
                if existing == &value {
                    return Ok(());
                }
                log::warn!(
                    "rejected conflicting write to shared key '{}' by '{}'",
                    key,
                    writer
                );
                Err(LatticeError::SharedStateConflict {
                    key: key.to_string(),
                })
            }
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.values.read().await.clone()
    }
}

/// Merge two values when their shapes allow it: objects union (recursing on
/// shared fields), arrays concatenate, equal scalars collapse
fn merge_values(existing: &Value, incoming: &Value) -> Option<Value> {
    match (existing, incoming) {
        (Value::Object(a), Value::Object(b)) => {
            let mut merged: Map<String, Value> = a.clone();
            for (k, v) in b {
                let combined = match merged.get(k) {
                    Some(current) => merge_values(current, v)?,
                    None => v.clone(),
                };
                merged.insert(k.clone(), combined);
            }
            Some(Value::Object(merged))
        }
        (Value::Array(a), Value::Array(b)) => {
            let mut merged = a.clone();
            merged.extend(b.iter().cloned());
            Some(Value::Array(merged))
        }
        (a, b) if a == b => Some(a.clone()),
        _ => None,
    }
}

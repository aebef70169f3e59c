// SPDX-License-Identifier: MIT

//! External capability boundary
//!
//! A `Capability` is anything a node can invoke: an LLM call, a tool, a plain
//! computation. The engine treats it as an opaque async call; everything
//! behind `invoke` is the collaborator's business.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::LatticeError;

/// Trait for external capabilities invocable from graph nodes.
///
/// `name()`, `description()` and `schema()` return references so lookups and
/// matching never allocate; implementations should store these in fields.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Returns the capability name (unique within a registry)
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the capability does
    fn description(&self) -> &str;

    /// Returns the JSON schema for the capability's input parameters
    fn schema(&self) -> &Value;

    /// Invoke the capability with the given parameters
    async fn invoke(&self, params: Value) -> Result<Value, LatticeError>;
}

/// Registry of capabilities, shared across nodes and executors
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: Arc<RwLock<HashMap<String, Arc<dyn Capability>>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            capabilities: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, capability: Arc<dyn Capability>) {
        let mut capabilities = self.capabilities.write().await;
        capabilities.insert(capability.name().to_string(), capability);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        let capabilities = self.capabilities.read().await;
        capabilities.get(name).cloned()
    }

    /// Snapshot of all registered capabilities, for description matching
    pub async fn all(&self) -> Vec<Arc<dyn Capability>> {
        let capabilities = self.capabilities.read().await;
        capabilities.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.capabilities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.capabilities.read().await.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FixedCapability;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = CapabilityRegistry::new();
        assert!(registry.is_empty().await);

        registry
            .register(Arc::new(FixedCapability::new("calc", json!(42))))
            .await;

        assert_eq!(registry.len().await, 1);
        let cap = registry.get("calc").await.unwrap();
        assert_eq!(cap.name(), "calc");
        assert_eq!(cap.invoke(json!({})).await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let registry = CapabilityRegistry::new();
        assert!(registry.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_reregister_replaces() {
        let registry = CapabilityRegistry::new();
        registry
            .register(Arc::new(FixedCapability::new("c", json!(1))))
            .await;
        registry
            .register(Arc::new(FixedCapability::new("c", json!(2))))
            .await;

        assert_eq!(registry.len().await, 1);
        let cap = registry.get("c").await.unwrap();
        assert_eq!(cap.invoke(json!({})).await.unwrap(), json!(2));
    }
}

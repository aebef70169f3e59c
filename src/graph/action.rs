// SPDX-License-Identifier: MIT

//! Action node: capability discovery, parameter validation, invocation
//!
//! Selection order: exact name match from state, then description keyword
//! match, then the configured fallback. Parameters are validated against the
//! selected capability's JSON schema before the call - missing or mistyped
//! parameters fail fast, nothing is coerced.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::capability::{Capability, CapabilityRegistry};
use crate::error::LatticeError;
use crate::state::ExecutionState;

use super::node::{resolve_params, Node, NodeOutcome};

pub struct ActionNode {
    id: String,
    description: String,
    registry: CapabilityRegistry,
    /// State key holding the requested capability name or free-text request
    request_key: String,
    /// Capability used when neither name nor description matching succeeds
    fallback: Option<String>,
    /// Parameter template, resolved against state (`$state.` references)
    params: Value,
    output_key: String,
}

impl ActionNode {
    pub fn new(
        id: impl Into<String>,
        registry: CapabilityRegistry,
        request_key: impl Into<String>,
        output_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            registry,
            request_key: request_key.into(),
            fallback: None,
            params: Value::Object(serde_json::Map::new()),
            output_key: output_key.into(),
        }
    }

    pub fn with_fallback(mut self, name: impl Into<String>) -> Self {
        self.fallback = Some(name.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Pick a capability for `request`: exact name, described capability,
    /// then fallback
    async fn select(&self, request: &str) -> Result<Arc<dyn Capability>, LatticeError> {
        if let Some(capability) = self.registry.get(request).await {
            log::debug!("node {}: exact match '{}'", self.id, request);
            return Ok(capability);
        }

        if let Some(capability) = self.match_description(request).await {
            log::debug!(
                "node {}: description match '{}' for request '{}'",
                self.id,
                capability.name(),
                request
            );
            return Ok(capability);
        }

        if let Some(name) = &self.fallback {
            if let Some(capability) = self.registry.get(name).await {
                log::debug!("node {}: falling back to '{}'", self.id, name);
                return Ok(capability);
            }
        }

        Err(LatticeError::CapabilityNotFound {
            name: request.to_string(),
        })
    }

    /// Score capabilities by how many request words their description
    /// mentions; highest positive score wins
    async fn match_description(&self, request: &str) -> Option<Arc<dyn Capability>> {
        let words: Vec<String> = request
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .filter(|w| w.len() > 2)
            .collect();
        if words.is_empty() {
            return None;
        }

        let mut best: Option<(usize, Arc<dyn Capability>)> = None;
        for capability in self.registry.all().await {
            let description = capability.description().to_lowercase();
            let score = words.iter().filter(|w| description.contains(w.as_str())).count();
            if score > 0 && best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                best = Some((score, capability));
            }
        }
        best.map(|(_, c)| c)
    }
}

/// Validate `params` against a capability's JSON schema: every required
/// property present, every provided property of the declared type
fn validate_params(capability: &dyn Capability, params: &Value) -> Result<(), LatticeError> {
    let schema = capability.schema();
    let name = capability.name();

    let obj = params
        .as_object()
        .ok_or_else(|| LatticeError::parameter(name, "parameters must be an object"))?;

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for req in required {
            let key = req.as_str().unwrap_or_default();
            match obj.get(key) {
                None | Some(Value::Null) => {
                    return Err(LatticeError::parameter(
                        name,
                        format!("missing required parameter '{}'", key),
                    ));
                }
                Some(_) => {}
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in obj {
            let Some(expected) = props.get(key).and_then(|p| p.get("type")).and_then(|t| t.as_str())
            else {
                continue;
            };
            if !json_type_matches(value, expected) {
                return Err(LatticeError::parameter(
                    name,
                    format!("parameter '{}' is not a {}", key, expected),
                ));
            }
        }
    }

    Ok(())
}

fn json_type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[async_trait]
impl Node for ActionNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, state: &mut ExecutionState) -> Result<NodeOutcome, LatticeError> {
        let request = state
            .get_path(&self.request_key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let capability = self.select(&request).await?;
        let params = resolve_params(&self.params, state);
        validate_params(capability.as_ref(), &params)?;

        let result = capability.invoke(params).await?;
        state.set(&self.output_key, result.clone());
        Ok(NodeOutcome::value(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::test_support::EMPTY_SCHEMA;
    use once_cell::sync::Lazy;
    use serde_json::json;

    static WEATHER_SCHEMA: Lazy<Value> = Lazy::new(|| {
        json!({
            "type": "object",
            "properties": {
                "city": { "type": "string" },
                "days": { "type": "integer" }
            },
            "required": ["city"]
        })
    });

    struct SchemaCapability {
        name: String,
        description: String,
        schema: &'static Value,
    }

    #[async_trait]
    impl Capability for SchemaCapability {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            &self.description
        }
        fn schema(&self) -> &Value {
            self.schema
        }
        async fn invoke(&self, params: Value) -> Result<Value, LatticeError> {
            Ok(json!({ "invoked": self.name, "params": params }))
        }
    }

    async fn registry_with_weather() -> CapabilityRegistry {
        let registry = CapabilityRegistry::new();
        registry
            .register(Arc::new(SchemaCapability {
                name: "weather_lookup".to_string(),
                description: "look up the weather forecast for a city".to_string(),
                schema: &WEATHER_SCHEMA,
            }))
            .await;
        registry
            .register(Arc::new(SchemaCapability {
                name: "echo".to_string(),
                description: "repeat the input back".to_string(),
                schema: &EMPTY_SCHEMA,
            }))
            .await;
        registry
    }

    #[tokio::test]
    async fn test_exact_name_match() {
        let registry = registry_with_weather().await;
        let node = ActionNode::new("act", registry, "tool", "result")
            .with_params(json!({"city": "Porto"}));

        let mut state = ExecutionState::empty();
        state.set("tool", json!("weather_lookup"));

        let outcome = node.execute(&mut state).await.unwrap();
        assert_eq!(outcome.value["invoked"], json!("weather_lookup"));
    }

    #[tokio::test]
    async fn test_description_match_beats_fallback() {
        let registry = registry_with_weather().await;
        let node = ActionNode::new("act", registry, "request", "result")
            .with_fallback("echo")
            .with_params(json!({"city": "Porto"}));

        let mut state = ExecutionState::empty();
        state.set("request", json!("what is the weather forecast"));

        let outcome = node.execute(&mut state).await.unwrap();
        assert_eq!(outcome.value["invoked"], json!("weather_lookup"));
    }

    #[tokio::test]
    async fn test_fallback_when_nothing_matches() {
        let registry = registry_with_weather().await;
        let node = ActionNode::new("act", registry, "request", "result").with_fallback("echo");

        let mut state = ExecutionState::empty();
        state.set("request", json!("zzz qqq xxx"));

        let outcome = node.execute(&mut state).await.unwrap();
        assert_eq!(outcome.value["invoked"], json!("echo"));
    }

    #[tokio::test]
    async fn test_no_match_no_fallback_errors() {
        let registry = registry_with_weather().await;
        let node = ActionNode::new("act", registry, "request", "result");

        let mut state = ExecutionState::empty();
        state.set("request", json!("zzz qqq xxx"));

        let err = node.execute(&mut state).await.unwrap_err();
        assert!(matches!(err, LatticeError::CapabilityNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_required_parameter_fails_fast() {
        let registry = registry_with_weather().await;
        let node = ActionNode::new("act", registry, "tool", "result");

        let mut state = ExecutionState::empty();
        state.set("tool", json!("weather_lookup"));

        let err = node.execute(&mut state).await.unwrap_err();
        assert!(matches!(err, LatticeError::ParameterValidation { .. }));
    }

    #[tokio::test]
    async fn test_mistyped_parameter_fails_fast() {
        let registry = registry_with_weather().await;
        let node = ActionNode::new("act", registry, "tool", "result")
            .with_params(json!({"city": "Porto", "days": "three"}));

        let mut state = ExecutionState::empty();
        state.set("tool", json!("weather_lookup"));

        let err = node.execute(&mut state).await.unwrap_err();
        assert!(matches!(err, LatticeError::ParameterValidation { .. }));
    }

    #[tokio::test]
    async fn test_params_resolved_from_state() {
        let registry = registry_with_weather().await;
        let node = ActionNode::new("act", registry, "tool", "result")
            .with_params(json!({"city": "$state.city"}));

        let mut state = ExecutionState::empty();
        state.set("tool", json!("weather_lookup"));
        state.set("city", json!("Faro"));

        let outcome = node.execute(&mut state).await.unwrap();
        assert_eq!(outcome.value["params"]["city"], json!("Faro"));
    }
}

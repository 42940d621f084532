//! Tools agents may call.
//!
//! Tool calls proposed during reasoning run at the tick boundary, and their
//! structured results reach the caller in its next percept. An agent can
//! only call tools named in its identity.

use crate::error::RoutingError;
use crate::message::ToolResult;
use crate::types::AgentId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Run the tool. Errors are reported back to the caller as data.
    fn call(&self, args: &Value) -> Result<Value, String>;
}

/// A tool call proposed by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

/// Tool backed by a plain function.
pub struct FunctionTool<F> {
    name: String,
    description: String,
    func: F,
}

impl<F> FunctionTool<F>
where
    F: Fn(&Value) -> Result<Value, String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            func,
        }
    }
}

impl<F> Tool for FunctionTool<F>
where
    F: Fn(&Value) -> Result<Value, String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn call(&self, args: &Value) -> Result<Value, String> {
        (self.func)(args)
    }
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), String> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(format!("Tool '{}' is already registered", name));
        }
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `(name, description)` of the registered tools among `allowed`.
    pub fn describe(&self, allowed: &[String]) -> Vec<(String, String)> {
        allowed
            .iter()
            .filter_map(|name| {
                self.tools
                    .get(name)
                    .map(|tool| (tool.name().to_string(), tool.description().to_string()))
            })
            .collect()
    }

    /// Run `call` for `agent` if the tool is allowed and registered.
    pub fn execute(
        &self,
        agent: &AgentId,
        allowed: &[String],
        call: &ToolCall,
    ) -> Result<ToolResult, RoutingError> {
        if !allowed.iter().any(|t| t == &call.tool) {
            return Err(RoutingError::ToolNotAllowed {
                agent: agent.clone(),
                tool: call.tool.clone(),
            });
        }
        let tool = self
            .tools
            .get(&call.tool)
            .ok_or_else(|| RoutingError::UnknownTool(call.tool.clone()))?;

        let output = match tool.call(&call.args) {
            Ok(value) => value,
            Err(e) => json!({"error": e, "tool": call.tool}),
        };
        Ok(ToolResult {
            tool: call.tool.clone(),
            output,
        })
    }
}

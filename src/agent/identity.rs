//! Agent identity ("DNA"): who an agent is and whom it listens to.

use crate::types::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar behaviour parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// Immutable agent identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub agent_id: AgentId,
    /// Free-form role tag.
    pub role: String,
    /// Publishers this agent subscribes to, in order.
    #[serde(default)]
    pub subscriptions: Vec<AgentId>,
    /// Names of tools this agent may call.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub behavior_params: BTreeMap<String, ParamValue>,
}

impl AgentIdentity {
    pub fn new(agent_id: impl Into<AgentId>, role: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            role: role.into(),
            subscriptions: Vec::new(),
            tools: Vec::new(),
            behavior_params: BTreeMap::new(),
        }
    }

    pub fn subscribe_to(mut self, publisher: impl Into<AgentId>) -> Self {
        self.subscriptions.push(publisher.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tools.push(tool.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.behavior_params.insert(name.into(), value);
        self
    }

    /// Whether this agent subscribes to `publisher`
    pub fn is_subscribed_to(&self, publisher: &AgentId) -> bool {
        self.subscriptions.contains(publisher)
    }
}

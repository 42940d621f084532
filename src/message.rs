//! Messages exchanged between agents.
//!
//! Three kinds travel through the router: broadcast [`Signal`]s, standing
//! subscription [`Projection`]s and on-demand [`ProjectionRequest`]s. All
//! payloads are structured JSON objects; none may carry private state.

use crate::types::{AgentId, Tick};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured message payload.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Lightweight broadcast, visible to every other agent at the next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub sender: AgentId,
    pub tick: Tick,
    /// Topic weights; a plain topic carries weight 1.0.
    #[serde(default)]
    pub topic_keys: BTreeMap<String, f64>,
    #[serde(default)]
    pub payload: Payload,
}

impl Signal {
    pub fn new(sender: AgentId, tick: Tick) -> Self {
        Self {
            sender,
            tick,
            topic_keys: BTreeMap::new(),
            payload: Payload::new(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic_keys.insert(topic.into(), 1.0);
        self
    }

    pub fn with_weighted_topic(mut self, topic: impl Into<String>, weight: f64) -> Self {
        self.topic_keys.insert(topic.into(), weight);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topic_keys.contains_key(topic)
    }
}

/// Which parts of a sender's exposed view a requester wants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeHint {
    /// Field allow-list; `None` asks for the whole view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

/// On-demand request for a projection of `target`'s exposed view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRequest {
    pub requester: AgentId,
    pub target: AgentId,
    pub shape_hint: ShapeHint,
}

/// How a projection reached its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionOrigin {
    Subscription,
    Request,
}

/// A sender's exposed view, shaped by the receiver's lens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub sender: AgentId,
    pub receiver: AgentId,
    pub tick: Tick,
    pub origin: ProjectionOrigin,
    pub payload: Payload,
}

/// Result of a tool call, delivered to the caller's next percept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub output: serde_json::Value,
}

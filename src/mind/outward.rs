//! Outward actions and model reply parsing.
//!
//! A model reply is free-form notes, optionally followed by a fenced `json`
//! block describing what the agent wants to do outside itself:
//!
//! ~~~text
//! I think the weather is turning.
//!
//! ```json
//! {"signals": [{"topics": ["weather"], "payload": {"forecast": "rain"}}],
//!  "env_updates": {"weather": "rain"}}
//! ```
//! ~~~

use crate::environment::EnvironmentUpdate;
use crate::error::ModelError;
use crate::message::{Payload, Signal};
use crate::tools::ToolCall;
use crate::types::{AgentId, Tick};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// Topic keys as either a plain list (weight 1.0 each) or a weight map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TopicSpec {
    List(Vec<String>),
    Weighted(BTreeMap<String, f64>),
}

impl Default for TopicSpec {
    fn default() -> Self {
        TopicSpec::List(Vec::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposedSignal {
    #[serde(default)]
    pub topics: TopicSpec,
    #[serde(default)]
    pub payload: Payload,
}

impl TopicSpec {
    /// Topic keys in declaration (list) or key (map) order.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            TopicSpec::List(topics) => topics.iter().map(String::as_str).collect(),
            TopicSpec::Weighted(weights) => weights.keys().map(String::as_str).collect(),
        }
    }
}

impl ProposedSignal {
    fn carries(&self, needle: &str) -> bool {
        self.topics.keys().iter().any(|t| t.contains(needle))
            || payload_contains(&self.payload, needle)
    }

    pub fn into_signal(self, sender: AgentId, tick: Tick) -> Signal {
        let mut signal = Signal::new(sender, tick);
        match self.topics {
            TopicSpec::List(topics) => {
                for topic in topics {
                    signal = signal.with_topic(topic);
                }
            }
            TopicSpec::Weighted(weights) => {
                for (topic, weight) in weights {
                    signal = signal.with_weighted_topic(topic, weight);
                }
            }
        }
        signal.payload = self.payload;
        signal
    }
}

/// Everything an agent proposes to do outside itself in one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutwardAction {
    pub signals: Vec<ProposedSignal>,
    /// Agents to request an on-demand projection from.
    pub requests: Vec<AgentId>,
    pub env_updates: BTreeMap<String, Value>,
    /// Replacement for the agent's externally visible view.
    pub expose: Option<Payload>,
    pub tool_calls: Vec<ToolCall>,
}

impl OutwardAction {
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
            && self.requests.is_empty()
            && self.env_updates.is_empty()
            && self.expose.is_none()
            && self.tool_calls.is_empty()
    }

    /// Append `other`'s proposals. A later `expose` replaces an earlier one.
    pub fn merge(&mut self, other: OutwardAction) {
        self.signals.extend(other.signals);
        for request in other.requests {
            if !self.requests.contains(&request) {
                self.requests.push(request);
            }
        }
        self.env_updates.extend(other.env_updates);
        if other.expose.is_some() {
            self.expose = other.expose;
        }
        self.tool_calls.extend(other.tool_calls);
    }

    pub fn environment_updates(&self, agent: &AgentId) -> Vec<EnvironmentUpdate> {
        self.env_updates
            .iter()
            .map(|(key, value)| EnvironmentUpdate {
                agent: agent.clone(),
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }
}

/// A parsed model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub notes: String,
    pub action: OutwardAction,
}

/// Split a reply into notes and outward action.
///
/// Without a fenced block the whole text is notes, untouched. A block that
/// is present but does not parse is a malformed response.
pub fn parse_reply(text: &str) -> Result<ModelReply, ModelError> {
    let Some(open) = text.find(FENCE_OPEN) else {
        return Ok(ModelReply {
            notes: text.to_string(),
            action: OutwardAction::default(),
        });
    };

    let body_start = open + FENCE_OPEN.len();
    let close = text[body_start..]
        .find(FENCE_CLOSE)
        .map(|offset| body_start + offset)
        .ok_or_else(|| ModelError::MalformedResponse("unterminated json block".to_string()))?;

    let action: OutwardAction = serde_json::from_str(text[body_start..close].trim())
        .map_err(|e| ModelError::MalformedResponse(format!("invalid action block: {}", e)))?;

    let before = text[..open].trim_end();
    let after = text[close + FENCE_CLOSE.len()..].trim_start();
    let notes = match (before.is_empty(), after.is_empty()) {
        (false, false) => format!("{}\n{}", before, after),
        (false, true) => before.to_string(),
        (true, _) => after.to_string(),
    };

    Ok(ModelReply { notes, action })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LeakReport {
    pub signals_dropped: usize,
    pub expose_dropped: bool,
    pub env_updates_dropped: usize,
}

impl LeakReport {
    pub fn total(&self) -> usize {
        self.signals_dropped + self.env_updates_dropped + usize::from(self.expose_dropped)
    }
}

fn value_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.contains(needle),
        Value::Array(items) => items.iter().any(|v| value_contains(v, needle)),
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| k.contains(needle) || value_contains(v, needle)),
        _ => false,
    }
}

fn payload_contains(payload: &Payload, needle: &str) -> bool {
    payload
        .iter()
        .any(|(k, v)| k.contains(needle) || value_contains(v, needle))
}

/// Whether `view` carries any non-empty secret verbatim.
pub fn view_leaks(view: &Payload, secrets: &[&str]) -> bool {
    secrets
        .iter()
        .any(|s| !s.is_empty() && payload_contains(view, s))
}

/// Drop every outward item that carries one of `secrets` verbatim, in a
/// payload, a topic key or an environment key.
pub fn strip_leaks(action: &mut OutwardAction, secrets: &[&str]) -> LeakReport {
    let secrets: Vec<&str> = secrets.iter().copied().filter(|s| !s.is_empty()).collect();
    let mut report = LeakReport::default();
    if secrets.is_empty() {
        return report;
    }
    let leaks = |payload: &Payload| secrets.iter().any(|s| payload_contains(payload, s));

    let before = action.signals.len();
    action
        .signals
        .retain(|signal| !secrets.iter().any(|s| signal.carries(s)));
    report.signals_dropped = before - action.signals.len();

    if action.expose.as_ref().map(leaks).unwrap_or(false) {
        action.expose = None;
        report.expose_dropped = true;
    }

    let before = action.env_updates.len();
    action
        .env_updates
        .retain(|key, value| !secrets.iter().any(|s| key.contains(s) || value_contains(value, s)));
    report.env_updates_dropped = before - action.env_updates.len();

    report
}

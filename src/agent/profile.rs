//! Agent profile: on-disk config shape and validation.

use super::identity::{AgentIdentity, ParamValue};
use crate::lens::LensConfig;
use crate::mind::MindMode;
use crate::types::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Agent configuration as supplied in the runtime config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Defaults to the table key when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    pub role: String,

    #[serde(default)]
    pub subscriptions: Vec<String>,

    #[serde(default)]
    pub tools: Vec<String>,

    #[serde(default)]
    pub behavior_params: BTreeMap<String, ParamValue>,

    #[serde(default)]
    pub lens: LensConfig,

    /// Overrides the runtime-wide mind mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<MindMode>,

    /// Overrides the runtime-wide branch styles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_styles: Option<Vec<String>>,

    /// Role instructions placed at the top of every reasoning prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl AgentConfig {
    /// Build the identity, using `key` when `agent_id` is not set.
    pub fn to_identity(&self, key: &str) -> AgentIdentity {
        let agent_id = self.agent_id.clone().unwrap_or_else(|| key.to_string());
        AgentIdentity {
            agent_id: AgentId::new(agent_id),
            role: self.role.clone(),
            subscriptions: self.subscriptions.iter().map(|s| AgentId::new(s.as_str())).collect(),
            tools: self.tools.clone(),
            behavior_params: self.behavior_params.clone(),
        }
    }
}

/// Validate agent configuration.
pub fn validate_agent_config(key: &str, agent: &AgentConfig) -> Result<(), String> {
    let agent_id = agent.agent_id.as_deref().unwrap_or(key);
    if agent_id.trim().is_empty() {
        return Err("Agent ID cannot be empty".to_string());
    }

    if agent.role.trim().is_empty() {
        return Err(format!("Agent '{}' has an empty role", agent_id));
    }

    let mut seen = HashSet::new();
    for publisher in &agent.subscriptions {
        if !seen.insert(publisher.as_str()) {
            return Err(format!(
                "Agent '{}' subscribes to '{}' more than once",
                agent_id, publisher
            ));
        }
    }

    for (name, value) in &agent.behavior_params {
        if let ParamValue::Float(f) = value {
            if !f.is_finite() {
                return Err(format!(
                    "Agent '{}' behavior param '{}' is not finite",
                    agent_id, name
                ));
            }
        }
    }

    if let Some(ref styles) = agent.branch_styles {
        if styles.iter().any(|s| s.trim().is_empty()) {
            return Err(format!("Agent '{}' has an empty branch style", agent_id));
        }
    }

    if let Some(ref prompt) = agent.system_prompt {
        if prompt.trim().is_empty() {
            return Err("System prompt cannot be empty if provided".to_string());
        }
    }

    Ok(())
}

//! Agent registry and subscription graph.

use super::identity::AgentIdentity;
use crate::error::RuntimeError;
use crate::types::AgentId;
use std::collections::{HashMap, HashSet};

/// Standing subscription: `subscriber` receives projections of `publisher`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionEdge {
    pub publisher: AgentId,
    pub subscriber: AgentId,
}

/// Graph validation result.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub checks: Vec<(String, bool)>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_check(&mut self, description: &str, passed: bool) {
        self.checks.push((description.to_string(), passed));
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn total_checks(&self) -> usize {
        self.checks.len()
    }

    pub fn passed_checks(&self) -> usize {
        self.checks.iter().filter(|(_, passed)| *passed).count()
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Agent registry holding identities in registration order.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentId, AgentIdentity>,
    order: Vec<AgentId>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new agent. Ids must be non-empty and unique.
    pub fn register(&mut self, identity: AgentIdentity) -> Result<(), RuntimeError> {
        if identity.agent_id.as_str().trim().is_empty() {
            return Err(RuntimeError::ConfigError(
                "Agent ID cannot be empty".to_string(),
            ));
        }
        if self.agents.contains_key(&identity.agent_id) {
            return Err(RuntimeError::DuplicateAgent(identity.agent_id));
        }
        self.order.push(identity.agent_id.clone());
        self.agents.insert(identity.agent_id.clone(), identity);
        Ok(())
    }

    /// Get an agent identity by ID
    pub fn get(&self, agent_id: &AgentId) -> Option<&AgentIdentity> {
        self.agents.get(agent_id)
    }

    /// Get an agent identity by ID, or `AgentNotFound`
    pub fn get_or_error(&self, agent_id: &AgentId) -> Result<&AgentIdentity, RuntimeError> {
        self.get(agent_id)
            .ok_or_else(|| RuntimeError::AgentNotFound(agent_id.clone()))
    }

    /// Check whether an agent is registered
    pub fn contains(&self, agent_id: &AgentId) -> bool {
        self.agents.contains_key(agent_id)
    }

    /// All identities in registration order.
    pub fn list_all(&self) -> Vec<&AgentIdentity> {
        self.order
            .iter()
            .filter_map(|id| self.agents.get(id))
            .collect()
    }

    /// Agent ids in registration order.
    pub fn ids(&self) -> &[AgentId] {
        &self.order
    }

    /// Number of registered agents
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Remove an agent, keeping the order of the rest
    pub fn remove(&mut self, agent_id: &AgentId) -> Option<AgentIdentity> {
        self.order.retain(|id| id != agent_id);
        self.agents.remove(agent_id)
    }

    /// Every subscription edge, ordered by subscriber registration order and
    /// then by the subscriber's own subscription order.
    pub fn edges(&self) -> Vec<SubscriptionEdge> {
        self.list_all()
            .into_iter()
            .flat_map(|subscriber| {
                subscriber
                    .subscriptions
                    .iter()
                    .map(move |publisher| SubscriptionEdge {
                        publisher: publisher.clone(),
                        subscriber: subscriber.agent_id.clone(),
                    })
            })
            .collect()
    }

    /// Check the subscription graph before the first tick.
    pub fn validate_graph(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        let mut unknown = false;
        let mut self_loop = false;
        for edge in self.edges() {
            if !self.contains(&edge.publisher) {
                unknown = true;
                result.add_error(format!(
                    "Agent '{}' subscribes to unregistered agent '{}'",
                    edge.subscriber, edge.publisher
                ));
            }
            if edge.publisher == edge.subscriber {
                self_loop = true;
                result.add_error(format!("Agent '{}' subscribes to itself", edge.subscriber));
            }
        }
        result.add_check("All subscriptions reference registered agents", !unknown);
        result.add_check("No agent subscribes to itself", !self_loop);

        let mut slugs: HashMap<String, &AgentId> = HashMap::new();
        let mut collision = false;
        for id in &self.order {
            if let Some(existing) = slugs.insert(id.sanitized(), id) {
                collision = true;
                result.add_error(format!(
                    "Agents '{}' and '{}' map to the same state directory '{}'",
                    existing,
                    id,
                    id.sanitized()
                ));
            }
        }
        result.add_check("State directories are distinct", !collision);

        let subscribed: HashSet<&AgentId> = self
            .list_all()
            .into_iter()
            .flat_map(|agent| agent.subscriptions.iter())
            .collect();
        for agent in self.list_all() {
            if agent.subscriptions.is_empty() && !subscribed.contains(&agent.agent_id) {
                result.add_warning(format!(
                    "Agent '{}' has no subscriptions and no subscribers",
                    agent.agent_id
                ));
            }
        }

        result
    }
}

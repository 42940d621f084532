//! Shared environment state
//!
//! A small key/value store visible to every agent. Agents only *request*
//! writes during reasoning; the runtime applies them in one sequential pass
//! at the tick boundary.

use crate::types::{AgentId, Tick};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Write requested by an agent during its reasoning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentUpdate {
    pub agent: AgentId,
    pub key: String,
    pub value: Value,
}

/// Two or more agents wrote the same key within one tick.
///
/// Resolution: the write from the agent registered last wins.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentWriteConflict {
    pub key: String,
    pub tick: Tick,
    pub writers: Vec<AgentId>,
    pub winner: AgentId,
}

/// Read-only snapshot handed to percepts.
pub type EnvironmentView = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentState {
    data: BTreeMap<String, Value>,
}

impl EnvironmentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            data: entries.into_iter().collect(),
        }
    }

    /// Get an environment value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Snapshot for percept building
    pub fn view(&self) -> EnvironmentView {
        self.data.clone()
    }

    /// Apply one tick's updates.
    ///
    /// `updates` must already be in agent registration order; within that
    /// order the last write to a key wins. Every key written by more than one
    /// agent is reported as a conflict.
    pub fn apply_updates(
        &mut self,
        tick: Tick,
        updates: Vec<EnvironmentUpdate>,
    ) -> Vec<EnvironmentWriteConflict> {
        let mut writers: BTreeMap<String, Vec<AgentId>> = BTreeMap::new();

        for update in updates {
            let entry = writers.entry(update.key.clone()).or_default();
            if !entry.contains(&update.agent) {
                entry.push(update.agent.clone());
            }
            self.data.insert(update.key, update.value);
        }

        let mut conflicts = Vec::new();
        for (key, agents) in writers {
            if agents.len() < 2 {
                continue;
            }
            let winner = agents[agents.len() - 1].clone();
            warn!(
                key = %key,
                tick,
                writers = ?agents,
                winner = %winner,
                "Conflicting environment writes; last writer by registration order wins"
            );
            conflicts.push(EnvironmentWriteConflict {
                key,
                tick,
                writers: agents,
                winner,
            });
        }
        conflicts
    }
}

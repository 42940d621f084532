//! In-memory private state store for tests and ephemeral runs.

use super::{PrivateStateEnvelope, PrivateStateStore};
use crate::error::StorageError;
use crate::types::AgentId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    versions: RwLock<HashMap<AgentId, BTreeMap<u64, PrivateStateEnvelope>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrivateStateStore for InMemoryStateStore {
    fn save(&self, envelope: &PrivateStateEnvelope) -> Result<(), StorageError> {
        let mut versions = self.versions.write();
        let agent_versions = versions.entry(envelope.agent_id.clone()).or_default();
        if agent_versions.contains_key(&envelope.version) {
            return Err(StorageError::VersionExists {
                agent: envelope.agent_id.clone(),
                version: envelope.version,
            });
        }
        agent_versions.insert(envelope.version, envelope.clone());
        Ok(())
    }

    fn load_latest(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<PrivateStateEnvelope>, StorageError> {
        Ok(self
            .versions
            .read()
            .get(agent_id)
            .and_then(|v| v.values().next_back().cloned()))
    }

    fn load_version(
        &self,
        agent_id: &AgentId,
        version: u64,
    ) -> Result<Option<PrivateStateEnvelope>, StorageError> {
        Ok(self
            .versions
            .read()
            .get(agent_id)
            .and_then(|v| v.get(&version).cloned()))
    }

    fn list_versions(&self, agent_id: &AgentId) -> Result<Vec<u64>, StorageError> {
        Ok(self
            .versions
            .read()
            .get(agent_id)
            .map(|v| v.keys().copied().collect())
            .unwrap_or_default())
    }
}

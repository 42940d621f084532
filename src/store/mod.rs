//! Private State Store
//!
//! Append-only, versioned storage of each agent's private state envelope.
//! Envelope content is opaque: it is framed for storage and never parsed.

pub mod file;
pub mod memory;

use crate::error::StorageError;
use crate::types::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use file::FileStateStore;
pub use memory::InMemoryStateStore;

/// Opaque private state text. `Debug` never prints the content.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivateContent(String);

impl PrivateContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PrivateContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateContent({} bytes)", self.0.len())
    }
}

/// One version of an agent's private state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateStateEnvelope {
    pub agent_id: AgentId,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub content: PrivateContent,
}

impl PrivateStateEnvelope {
    pub fn new(agent_id: AgentId, version: u64, content: PrivateContent) -> Self {
        Self {
            agent_id,
            version,
            created_at: Utc::now(),
            content,
        }
    }
}

/// Storage backend for private state envelopes.
///
/// `save` is atomic and append-only: a version, once written, is never
/// replaced. `load_latest` skips unreadable versions.
pub trait PrivateStateStore: Send + Sync {
    fn save(&self, envelope: &PrivateStateEnvelope) -> Result<(), StorageError>;

    fn load_latest(&self, agent_id: &AgentId)
        -> Result<Option<PrivateStateEnvelope>, StorageError>;

    fn load_version(
        &self,
        agent_id: &AgentId,
        version: u64,
    ) -> Result<Option<PrivateStateEnvelope>, StorageError>;

    /// Every stored version number, ascending.
    fn list_versions(&self, agent_id: &AgentId) -> Result<Vec<u64>, StorageError>;
}

/// Store access scoped to a single agent.
///
/// Each mind receives exactly one handle, for its own id.
#[derive(Clone)]
pub struct AgentStateHandle {
    agent_id: AgentId,
    store: Arc<dyn PrivateStateStore>,
}

impl AgentStateHandle {
    pub fn new(agent_id: AgentId, store: Arc<dyn PrivateStateStore>) -> Self {
        Self { agent_id, store }
    }

    /// The agent this handle writes for
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Newest readable version for this agent
    pub fn load_latest(&self) -> Result<Option<PrivateStateEnvelope>, StorageError> {
        self.store.load_latest(&self.agent_id)
    }

    /// Commit `content` as the version after `prior_version` (0 when there is
    /// no prior state).
    ///
    /// Unreadable versions above `prior_version` still occupy their number,
    /// so the new version goes after the highest stored one.
    pub fn commit(
        &self,
        prior_version: u64,
        content: PrivateContent,
    ) -> Result<PrivateStateEnvelope, StorageError> {
        let highest = self
            .store
            .list_versions(&self.agent_id)?
            .last()
            .copied()
            .unwrap_or(0);
        let version = prior_version.max(highest) + 1;
        let envelope = PrivateStateEnvelope::new(self.agent_id.clone(), version, content);
        self.store.save(&envelope)?;
        Ok(envelope)
    }
}

impl fmt::Debug for AgentStateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentStateHandle")
            .field("agent_id", &self.agent_id)
            .finish()
    }
}

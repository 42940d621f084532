//! File-backed private state store.
//!
//! Layout:
//!
//! ```text
//! root/
//!   <sanitized agent id>/
//!     v1.json
//!     v2.json
//! ```
//!
//! Each file holds one pretty-printed JSON envelope. Writes go to a hidden
//! temp file in the same directory and are renamed into place, so a reader
//! never observes a partial version.

use super::{PrivateStateEnvelope, PrivateStateStore};
use crate::error::StorageError;
use crate::types::AgentId;
use std::path::{Path, PathBuf};

const PROBE_FILE: &str = ".write-probe";

#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    /// Open a store rooted at `root`, creating it if needed.
    ///
    /// Fails when the root cannot be created or written to.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            StorageError::NotWritable(format!("{}: {}", root.display(), e))
        })?;

        let probe = root.join(PROBE_FILE);
        std::fs::write(&probe, b"ok")
            .and_then(|_| std::fs::remove_file(&probe))
            .map_err(|e| StorageError::NotWritable(format!("{}: {}", root.display(), e)))?;

        Ok(Self { root })
    }

    /// State root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one agent's versions
    pub fn agent_dir(&self, agent_id: &AgentId) -> PathBuf {
        self.root.join(agent_id.sanitized())
    }

    /// Path of one version file
    pub fn version_path(&self, agent_id: &AgentId, version: u64) -> PathBuf {
        self.agent_dir(agent_id).join(format!("v{}.json", version))
    }

    fn parse_version(file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix('v')?
            .strip_suffix(".json")?
            .parse()
            .ok()
    }

    fn read_envelope(&self, path: &Path) -> Result<PrivateStateEnvelope, StorageError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| StorageError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

impl PrivateStateStore for FileStateStore {
    fn save(&self, envelope: &PrivateStateEnvelope) -> Result<(), StorageError> {
        let dir = self.agent_dir(&envelope.agent_id);
        std::fs::create_dir_all(&dir)?;

        let path = self.version_path(&envelope.agent_id, envelope.version);
        if path.exists() {
            return Err(StorageError::VersionExists {
                agent: envelope.agent_id.clone(),
                version: envelope.version,
            });
        }

        let serialized = serde_json::to_string_pretty(envelope)?;
        let temp_path = dir.join(format!(".v{}.json.tmp", envelope.version));
        if let Err(e) = std::fs::write(&temp_path, serialized)
            .and_then(|_| std::fs::rename(&temp_path, &path))
        {
            let _ = std::fs::remove_file(&temp_path);
            return Err(StorageError::IoError(e));
        }

        tracing::debug!(
            agent_id = %envelope.agent_id,
            version = envelope.version,
            path = %path.display(),
            "Saved private state version"
        );
        Ok(())
    }

    fn load_latest(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<PrivateStateEnvelope>, StorageError> {
        let versions = self.list_versions(agent_id)?;
        for version in versions.into_iter().rev() {
            let path = self.version_path(agent_id, version);
            match self.read_envelope(&path) {
                Ok(envelope) => return Ok(Some(envelope)),
                Err(e) => {
                    tracing::warn!(
                        agent_id = %agent_id,
                        version,
                        error = %e,
                        "Skipping unreadable private state version"
                    );
                }
            }
        }
        Ok(None)
    }

    fn load_version(
        &self,
        agent_id: &AgentId,
        version: u64,
    ) -> Result<Option<PrivateStateEnvelope>, StorageError> {
        let path = self.version_path(agent_id, version);
        if !path.exists() {
            return Ok(None);
        }
        self.read_envelope(&path).map(Some)
    }

    fn list_versions(&self, agent_id: &AgentId) -> Result<Vec<u64>, StorageError> {
        let dir = self.agent_dir(agent_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read directory entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            if let Some(version) = entry.file_name().to_str().and_then(Self::parse_version) {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

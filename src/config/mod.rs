//! Runtime configuration.
//!
//! Sources merge in order: built-in defaults, a TOML file, then
//! `MINDGRAPH__*` environment variables (`__` separates nested keys, so
//! `MINDGRAPH__MODEL__TIMEOUT_MS=5000` sets `model.timeout_ms`).

pub mod loader;

use crate::agent::{validate_agent_config, AgentConfig};
use crate::error::RuntimeError;
use crate::logging::LoggingConfig;
use crate::mind::{MindConfig, MindMode};
use crate::provider::{CompletionOptions, ProviderConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub use loader::ConfigLoader;

pub const DEFAULT_MODEL_TIMEOUT_MS: u64 = 30_000;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub model: ModelConfig,

    /// HTTP model provider; omitted when the caller supplies its own client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,

    #[serde(default)]
    pub mind: MindDefaults,

    /// Agents keyed by id, registered in key order.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// State root for the file backend; defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl StoreConfig {
    /// Configured root, else `<platform data dir>/state`.
    pub fn resolve_root(&self) -> Result<PathBuf, RuntimeError> {
        if let Some(root) = &self.root {
            if !root.as_os_str().is_empty() {
                return Ok(root.clone());
            }
        }
        let project_dirs = directories::ProjectDirs::from("", "mindgraph", "mindgraph")
            .ok_or_else(|| {
                RuntimeError::ConfigError(
                    "Could not determine platform data directory for state store".to_string(),
                )
            })?;
        Ok(project_dirs.data_dir().join("state"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Per-call timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub options: CompletionOptions,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_MODEL_TIMEOUT_MS
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            options: CompletionOptions::default(),
        }
    }
}

/// Mind settings applied to agents that do not override them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MindDefaults {
    #[serde(default)]
    pub mode: MindMode,

    #[serde(default)]
    pub branch_styles: Vec<String>,
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.model.timeout_ms == 0 {
            return Err(RuntimeError::ConfigError(
                "model.timeout_ms must be greater than zero".to_string(),
            ));
        }
        for (key, agent) in &self.agents {
            validate_agent_config(key, agent).map_err(RuntimeError::ConfigError)?;
        }
        Ok(())
    }

    /// Mind settings for one agent: runtime defaults overlaid with the
    /// agent's own overrides.
    pub fn mind_config_for(&self, agent: &AgentConfig) -> MindConfig {
        let mut options = self.model.options.clone();
        if agent.system_prompt.is_some() {
            options.system_prompt = agent.system_prompt.clone();
        }
        MindConfig {
            mode: agent.mode.unwrap_or(self.mind.mode),
            branch_styles: agent
                .branch_styles
                .clone()
                .unwrap_or_else(|| self.mind.branch_styles.clone()),
            timeout: Duration::from_millis(self.model.timeout_ms),
            options,
        }
    }
}

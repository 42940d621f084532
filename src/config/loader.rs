//! ConfigLoader: composes defaults, file and environment sources and
//! deserializes them into [`RuntimeConfig`].

use super::{RuntimeConfig, DEFAULT_MODEL_TIMEOUT_MS};
use crate::agent::AgentConfig;
use crate::error::RuntimeError;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Environment variable prefix; nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "MINDGRAPH";

/// The `agents` table read directly from TOML. The `config` crate folds
/// keys to lowercase, and agent ids and behaviour parameter names are
/// case-sensitive.
#[derive(Debug, Default, Deserialize)]
struct AgentsTable {
    #[serde(default)]
    agents: BTreeMap<String, AgentConfig>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from a TOML file with environment overlay, then validate.
    pub fn load(path: &Path) -> Result<RuntimeConfig, RuntimeError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::load_from_str(&text)
    }

    /// Load from TOML text with environment overlay, then validate.
    ///
    /// Agents come from the TOML text only, with their keys as written.
    pub fn load_from_str(toml: &str) -> Result<RuntimeConfig, RuntimeError> {
        let builder = builder_with_defaults()?.add_source(File::from_str(toml, FileFormat::Toml));
        let mut config = Self::build_config(add_environment(builder))?;
        let table: AgentsTable = toml::from_str(toml)
            .map_err(|e| RuntimeError::ConfigError(format!("Invalid agents table: {}", e)))?;
        config.agents = table.agents;
        config.validate()?;
        Ok(config)
    }

    /// Defaults and environment only.
    pub fn load_from_env() -> Result<RuntimeConfig, RuntimeError> {
        let config = Self::build_config(add_environment(builder_with_defaults()?))?;
        config.validate()?;
        Ok(config)
    }

    fn build_config(builder: ConfigBuilder<DefaultState>) -> Result<RuntimeConfig, RuntimeError> {
        Ok(builder.build()?.try_deserialize()?)
    }
}

fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("model.timeout_ms", DEFAULT_MODEL_TIMEOUT_MS as i64)?
        .set_default("store.backend", "file")?
        .set_default("mind.mode", "full")
}

fn add_environment(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}

//! Error types
//!
//! Each failure domain has its own error type. Routing, model and storage
//! errors are recovered locally by the runtime and logged; only
//! [`RuntimeError`] values returned from startup or tick-boundary checks are
//! fatal to a run.

use crate::types::{AgentId, Tick};
use thiserror::Error;

/// Message routing failures. The affected message is dropped for the
/// affected receiver only.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Unknown target agent: {0}")]
    UnknownTarget(AgentId),

    #[error("Perception filter of {receiver} failed: {reason}")]
    FilterFailed { receiver: AgentId, reason: String },

    #[error("Tool '{tool}' is not allowed for agent {agent}")]
    ToolNotAllowed { agent: AgentId, tool: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Language-model call failures. Recovered by copying private state forward.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model unavailable: {0}")]
    Unavailable(String),

    #[error("Model call timed out after {0} ms")]
    Timeout(u64),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

/// Private state store failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt state file {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State directory not writable: {0}")]
    NotWritable(String),

    #[error("Version {version} already exists for agent {agent}")]
    VersionExists { agent: AgentId, version: u64 },
}

/// Top-level error for runtime setup and tick-boundary checks.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Duplicate agent: {0}")]
    DuplicateAgent(AgentId),

    #[error("Tick {requested} is not after last tick {last}")]
    NonMonotonicTick { requested: Tick, last: Tick },

    #[error("Runtime has been shut down")]
    ShutDown,

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<config::ConfigError> for RuntimeError {
    fn from(err: config::ConfigError) -> Self {
        RuntimeError::ConfigError(err.to_string())
    }
}

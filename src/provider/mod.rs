//! Language-model providers.
//!
//! The runtime talks to models only through [`ModelClient`]: a prompt goes
//! in, text comes out. Every call is bounded by a timeout; a timed-out call
//! surfaces as [`ModelError::Timeout`] like any other model failure.

pub mod config;
pub mod http;

use crate::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use config::{ProviderConfig, ProviderType};
pub use http::ChatCompletionsClient;

/// Per-call generation options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// External language-model call.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str, options: &CompletionOptions)
        -> Result<String, ModelError>;
}

/// Call `client` with a bounded wait.
pub async fn generate_with_timeout(
    client: &dyn ModelClient,
    prompt: &str,
    options: &CompletionOptions,
    timeout: Duration,
) -> Result<String, ModelError> {
    match tokio::time::timeout(timeout, client.generate(prompt, options)).await {
        Ok(result) => result,
        Err(_) => Err(ModelError::Timeout(timeout.as_millis() as u64)),
    }
}

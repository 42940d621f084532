use super::CompletionOptions;
use crate::error::RuntimeError;
use serde::{Deserialize, Serialize};

/// Model provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type.
    pub provider_type: ProviderType,

    /// Model identifier.
    pub model: String,

    /// API key optional and can be loaded from environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of a chat-completions compatible API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Default completion options for this provider.
    #[serde(default)]
    pub default_options: CompletionOptions,
}

/// Provider type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "local")]
    LocalCustom,
}

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

impl ProviderConfig {
    fn endpoint_has_scheme(endpoint: &str) -> bool {
        endpoint.starts_with("http://") || endpoint.starts_with("https://")
    }

    fn infer_endpoint_scheme(provider_type: ProviderType, endpoint: &str) -> String {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if provider_type == ProviderType::LocalCustom && !Self::endpoint_has_scheme(endpoint) {
            format!("https://{}", endpoint)
        } else {
            endpoint.to_string()
        }
    }

    /// Base URL used for requests, falling back to the provider default.
    pub fn base_url(&self) -> Option<String> {
        match (&self.endpoint, self.provider_type) {
            (Some(endpoint), provider_type) => {
                Some(Self::infer_endpoint_scheme(provider_type, endpoint))
            }
            (None, ProviderType::OpenAI) => Some(OPENAI_BASE_URL.to_string()),
            (None, ProviderType::Ollama) => Some(OLLAMA_BASE_URL.to_string()),
            (None, ProviderType::LocalCustom) => None,
        }
    }

    /// API key from config, else from `OPENAI_API_KEY` for OpenAI.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| match self.provider_type {
            ProviderType::OpenAI => std::env::var("OPENAI_API_KEY").ok(),
            _ => None,
        })
    }

    /// Validate provider configuration.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.model.trim().is_empty() {
            return Err(RuntimeError::ConfigError(
                "Model name cannot be empty".to_string(),
            ));
        }

        match self.base_url() {
            None => {
                return Err(RuntimeError::ConfigError(
                    "Local provider requires endpoint".to_string(),
                ))
            }
            Some(url) if !Self::endpoint_has_scheme(&url) => {
                return Err(RuntimeError::ConfigError(format!(
                    "Invalid endpoint URL: {}",
                    url
                )))
            }
            Some(_) => {}
        }

        if self.provider_type == ProviderType::OpenAI && self.resolve_api_key().is_none() {
            return Err(RuntimeError::ConfigError(
                "OpenAI API key required (set in config or OPENAI_API_KEY env var)".to_string(),
            ));
        }

        if let Some(temp) = self.default_options.temperature {
            if !(0.0..=2.0).contains(&temp) {
                return Err(RuntimeError::ConfigError(format!(
                    "Temperature must be between 0.0 and 2.0, got {}",
                    temp
                )));
            }
        }

        Ok(())
    }
}

//! Chat-completions HTTP client (OpenAI-compatible APIs, Ollama, local
//! gateways).

use super::{CompletionOptions, ModelClient, ProviderConfig};
use crate::error::{ModelError, RuntimeError};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct ChatCompletionsClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    defaults: CompletionOptions,
}

impl ChatCompletionsClient {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let base_url = config.base_url().ok_or_else(|| {
            RuntimeError::ConfigError("Provider endpoint could not be resolved".to_string())
        })?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
            defaults: config.default_options.clone(),
        })
    }

    fn request_body(&self, prompt: &str, options: &CompletionOptions) -> Value {
        let system_prompt = options
            .system_prompt
            .as_ref()
            .or(self.defaults.system_prompt.as_ref());
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(t) = options.temperature.or(self.defaults.temperature) {
            body["temperature"] = json!(t);
        }
        if let Some(m) = options.max_tokens.or(self.defaults.max_tokens) {
            body["max_tokens"] = json!(m);
        }
        body
    }
}

/// Pull the first choice's message text out of a chat-completions response.
fn extract_content(response: &Value) -> Result<String, ModelError> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            ModelError::MalformedResponse("response has no choices[0].message.content".to_string())
        })
}

#[async_trait]
impl ModelClient for ChatCompletionsClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, ModelError> {
        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, options));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::Unavailable(format!(
                "{} returned HTTP {}",
                self.base_url, status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(e.to_string()))?;
        extract_content(&body)
    }
}

//! Provedor Anthropic (`messages`).

use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::{http_client, send_json, token_count, Completion, LlmProvider, Prompt, ProviderError, TokenUsage};
use crate::types::config::ProviderConfig;

const NAME: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| ProviderError::MissingApiKey(NAME.to_string()))?
            .to_string();
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            config: config.clone(),
        })
    }

    fn build_body(&self, model: &str, prompt: &Prompt) -> Value {
        let mut system = prompt.system.clone();
        if prompt.json_output {
            system.push_str("\nRespond with a single JSON object and nothing else.");
        }
        json!({
            "model": model,
            "system": system,
            "messages": [{ "role": "user", "content": prompt.user }],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        })
    }

    fn parse_body(model: &str, body: &Value) -> Result<Completion, ProviderError> {
        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| ProviderError::invalid(NAME, "missing content"))?;

        let text: String = blocks
            .iter()
            .filter(|b| b["type"] == "text")
            .filter_map(|b| b["text"].as_str())
            .collect();
        if text.is_empty() {
            return Err(ProviderError::invalid(NAME, "no text blocks in response"));
        }

        Ok(Completion {
            text,
            model: body["model"].as_str().unwrap_or(model).to_string(),
            usage: TokenUsage {
                input_tokens: token_count(&body["usage"]["input_tokens"]),
                output_tokens: token_count(&body["usage"]["output_tokens"]),
            },
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn display_name(&self) -> &str {
        "Anthropic"
    }

    fn models(&self) -> &[String] {
        &self.config.models
    }

    async fn complete(&self, model: &str, prompt: &Prompt) -> Result<Completion, ProviderError> {
        let request = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.build_body(model, prompt));

        let body = send_json(NAME, self.config.timeout_secs, request).await?;
        Self::parse_body(model, &body)
    }
}

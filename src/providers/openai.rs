//! Provedor OpenAI (`chat/completions`).

use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::{http_client, send_json, token_count, Completion, LlmProvider, Prompt, ProviderError, TokenUsage};
use crate::types::config::ProviderConfig;

const NAME: &str = "openai";

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    config: ProviderConfig,
}

impl OpenAiProvider {
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

    /// Modelos de raciocínio (`o1`, `o3-mini`...) não aceitam `temperature`
    /// e usam `max_completion_tokens`.
    fn is_reasoning_model(model: &str) -> bool {
        let mut chars = model.chars();
        chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit())
    }

    fn build_body(&self, model: &str, prompt: &Prompt) -> Value {
        let mut body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user }
            ],
        });

        if Self::is_reasoning_model(model) {
            body["max_completion_tokens"] = json!(self.config.max_tokens);
        } else {
            body["max_tokens"] = json!(self.config.max_tokens);
            body["temperature"] = json!(self.config.temperature);
        }
        if prompt.json_output {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }

    fn parse_body(model: &str, body: &Value) -> Result<Completion, ProviderError> {
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::invalid(NAME, "missing choices[0].message.content"))?
            .to_string();

        Ok(Completion {
            text,
            model: body["model"].as_str().unwrap_or(model).to_string(),
            usage: TokenUsage {
                input_tokens: token_count(&body["usage"]["prompt_tokens"]),
                output_tokens: token_count(&body["usage"]["completion_tokens"]),
            },
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn display_name(&self) -> &str {
        "OpenAI"
    }

    fn models(&self) -> &[String] {
        &self.config.models
    }

    async fn complete(&self, model: &str, prompt: &Prompt) -> Result<Completion, ProviderError> {
        let request = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(&self.build_body(model, prompt));

        let body = send_json(NAME, self.config.timeout_secs, request).await?;
        Self::parse_body(model, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(&ProviderConfig::openai().with_api_key("sk-test")).unwrap()
    }

    #[test]
    fn test_reasoning_model_detection() {
        assert!(OpenAiProvider::is_reasoning_model("o3-mini"));
        assert!(OpenAiProvider::is_reasoning_model("o1"));
        assert!(!OpenAiProvider::is_reasoning_model("gpt-4o"));
        assert!(!OpenAiProvider::is_reasoning_model("omni"));
    }

    #[test]
    fn test_build_body_chat_model() {
        let body = provider().build_body("gpt-4o", &Prompt::new("sys", "user").with_json_output());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("temperature").is_some());
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_build_body_reasoning_model() {
        let body = provider().build_body("o3-mini", &Prompt::new("sys", "user"));
        assert_eq!(body["max_completion_tokens"], 4096);
        assert!(body.get("temperature").is_none());
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_parse_body() {
        let body = json!({
            "model": "gpt-4o-2024-08-06",
            "choices": [{ "message": { "role": "assistant", "content": "{\"summary\":\"ok\"}" } }],
            "usage": { "prompt_tokens": 20, "completion_tokens": 5 }
        });
        let completion = OpenAiProvider::parse_body("gpt-4o", &body).unwrap();
        assert_eq!(completion.text, "{\"summary\":\"ok\"}");
        assert_eq!(completion.model, "gpt-4o-2024-08-06");
        assert_eq!(completion.usage.output_tokens, 5);
    }

    #[test]
    fn test_parse_body_without_choices() {
        assert!(OpenAiProvider::parse_body("gpt-4o", &json!({"choices": []})).is_err());
    }
}

//! Provedor Google Gemini (`generateContent`).

use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::{http_client, send_json, token_count, Completion, LlmProvider, Prompt, ProviderError, TokenUsage};
use crate::types::config::ProviderConfig;

const NAME: &str = "gemini";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    config: ProviderConfig,
}

impl GeminiProvider {
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

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    fn build_body(&self, prompt: &Prompt) -> Value {
        let mut generation = json!({
            "temperature": self.config.temperature,
            "maxOutputTokens": self.config.max_tokens,
        });
        if prompt.json_output {
            generation["responseMimeType"] = json!("application/json");
        }

        json!({
            "systemInstruction": { "parts": [{ "text": prompt.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
            "generationConfig": generation,
        })
    }

    fn parse_body(model: &str, body: &Value) -> Result<Completion, ProviderError> {
        let Some(parts) = body["candidates"][0]["content"]["parts"].as_array() else {
            let reason = body["promptFeedback"]["blockReason"]
                .as_str()
                .map(|r| format!("prompt blocked ({})", r))
                .unwrap_or_else(|| "missing candidates".to_string());
            return Err(ProviderError::invalid(NAME, reason));
        };

        let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
        if text.is_empty() {
            return Err(ProviderError::invalid(NAME, "empty candidate"));
        }

        Ok(Completion {
            text,
            model: model.to_string(),
            usage: TokenUsage {
                input_tokens: token_count(&body["usageMetadata"]["promptTokenCount"]),
                output_tokens: token_count(&body["usageMetadata"]["candidatesTokenCount"]),
            },
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn display_name(&self) -> &str {
        "Google Gemini"
    }

    fn models(&self) -> &[String] {
        &self.config.models
    }

    async fn complete(&self, model: &str, prompt: &Prompt) -> Result<Completion, ProviderError> {
        let request = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_body(prompt));

        let body = send_json(NAME, self.config.timeout_secs, request).await?;
        Self::parse_body(model, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(&ProviderConfig::gemini().with_api_key("test-key")).unwrap()
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            GeminiProvider::new(&ProviderConfig::gemini()),
            Err(ProviderError::MissingApiKey(_))
        ));
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            provider().endpoint("gemini-1.5-pro"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn test_build_body() {
        let body = provider().build_body(&Prompt::new("be strict", "review this").with_json_output());
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be strict");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "review this");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[test]
    fn test_parse_body() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Looks " }, { "text": "good" }] } }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 3 }
        });
        let completion = GeminiProvider::parse_body("gemini-1.5-flash", &body).unwrap();
        assert_eq!(completion.text, "Looks good");
        assert_eq!(completion.usage.input_tokens, 12);
        assert_eq!(completion.usage.output_tokens, 3);
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let body = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = GeminiProvider::parse_body("gemini-1.5-pro", &body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}

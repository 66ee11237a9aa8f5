//! Trait base para provedores LLM.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Erros de provedores LLM.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Missing API key for provider '{0}'")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned status {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Rate limited by '{0}'")]
    RateLimited(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("Model '{model}' is not served by {provider}")]
    UnsupportedModel { provider: String, model: String },

    #[error("Failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Retorna true se uma nova tentativa pode ter sucesso.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ProviderError::Status { status, .. } => *status >= 500 || *status == 408,
            ProviderError::RateLimited(_) | ProviderError::Timeout(_) => true,
            ProviderError::MissingApiKey(_)
            | ProviderError::InvalidResponse { .. }
            | ProviderError::UnsupportedModel { .. }
            | ProviderError::Exhausted { .. } => false,
        }
    }

    pub(crate) fn invalid(provider: &str, message: impl Into<String>) -> Self {
        ProviderError::InvalidResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Prompt enviado ao modelo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    /// Pede resposta em JSON ao provedor, quando suportado.
    pub json_output: bool,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            json_output: false,
        }
    }

    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Uso de tokens reportado pelo provedor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Resposta de um modelo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// Trait para provedores LLM acessados por HTTP.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Identificador do provedor (`gemini`, `openai`, `anthropic`).
    fn name(&self) -> &str;

    /// Nome para exibição.
    fn display_name(&self) -> &str;

    /// Modelos servidos por este provedor.
    fn models(&self) -> &[String];

    /// Retorna true se o modelo é servido por este provedor.
    fn serves(&self, model: &str) -> bool {
        self.models().iter().any(|m| m == model)
    }

    /// Envia o prompt ao modelo e devolve o texto gerado.
    async fn complete(&self, model: &str, prompt: &Prompt) -> Result<Completion, ProviderError>;
}

/// Cria o cliente HTTP de um provedor.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .user_agent(concat!("critica/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Envia a requisição e devolve o corpo JSON, classificando falhas.
pub(crate) async fn send_json(
    provider: &str,
    timeout_secs: u64,
    request: reqwest::RequestBuilder,
) -> Result<Value, ProviderError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::Timeout(timeout_secs)
        } else {
            ProviderError::Http(e)
        }
    })?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited(provider.to_string()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: truncate(&body, 500),
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| ProviderError::invalid(provider, e.to_string()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

pub(crate) fn token_count(value: &Value) -> u32 {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::RateLimited("openai".into()).is_retryable());
        assert!(ProviderError::Timeout(30).is_retryable());
        assert!(ProviderError::Status {
            provider: "gemini".into(),
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::Status {
            provider: "gemini".into(),
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::MissingApiKey("anthropic".into()).is_retryable());
        assert!(!ProviderError::invalid("openai", "no choices").is_retryable());
    }

    #[test]
    fn test_exhausted_wraps_source() {
        let err = ProviderError::Exhausted {
            attempts: 3,
            source: Box::new(ProviderError::Timeout(10)),
        };
        assert!(err.to_string().contains("3 attempts"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[test]
    fn test_prompt_builder() {
        let prompt = Prompt::new("sys", "user").with_json_output();
        assert!(prompt.json_output);
        assert_eq!(prompt.system, "sys");
    }
}

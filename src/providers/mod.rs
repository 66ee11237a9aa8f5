//! Provedores LLM acessados por HTTP.
//!
//! - [`GeminiProvider`] - Google Gemini (`generateContent`)
//! - [`OpenAiProvider`] - OpenAI (`chat/completions`)
//! - [`AnthropicProvider`] - Anthropic (`messages`)
//!
//! Toda chamada passa pelo [`ProviderRegistry`], que aplica a
//! [`RetryPolicy`] configurada.

mod anthropic;
mod base;
mod gemini;
mod openai;
mod registry;
mod retry;

pub use anthropic::AnthropicProvider;
pub use base::{Completion, LlmProvider, Prompt, ProviderError, TokenUsage};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use registry::{ProviderRegistry, ResolvedModel};
pub use retry::{Backoff, RetryPolicy};

#[cfg(test)]
pub(crate) use registry::tests::MockProvider;

//! Registro de provedores e resolução de modelos.

use std::sync::Arc;
use tracing::{debug, info};

use super::anthropic::AnthropicProvider;
use super::base::{Completion, LlmProvider, Prompt};
use super::gemini::GeminiProvider;
use super::openai::OpenAiProvider;
use super::retry::RetryPolicy;
use crate::framing::{KeyNormalizer, KeyStyle};
use crate::types::config::Config;
use crate::types::responses::{AvailableModels, ModelSummary};
use crate::{CriticaError, CriticaResult};

/// Modelo escolhido para uma requisição.
#[derive(Clone)]
pub struct ResolvedModel {
    pub provider: Arc<dyn LlmProvider>,
    pub model: String,
}

impl std::fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

/// Provedores com API key configurada.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn LlmProvider>>,
    default_model: Option<String>,
    retry: RetryPolicy,
    normalizer: KeyNormalizer,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self {
            providers,
            default_model: None,
            retry: RetryPolicy::default(),
            normalizer: KeyNormalizer::default(),
        }
    }

    /// Cria o registro a partir da configuração. Provedores sem API key ou
    /// desabilitados ficam de fora.
    pub fn from_config(config: &Config) -> CriticaResult<Self> {
        let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::new();

        for (name, provider_config) in config.providers.iter() {
            if !provider_config.is_usable() {
                debug!(provider = name, "Provider not configured, skipping");
                continue;
            }
            let provider: Arc<dyn LlmProvider> = match name {
                "gemini" => Arc::new(GeminiProvider::new(provider_config)?),
                "openai" => Arc::new(OpenAiProvider::new(provider_config)?),
                "anthropic" => Arc::new(AnthropicProvider::new(provider_config)?),
                other => return Err(CriticaError::config(format!("unknown provider '{}'", other))),
            };
            info!(provider = name, models = provider.models().len(), "Provider enabled");
            providers.push(provider);
        }

        Ok(Self::new(providers)
            .with_default_model(config.review.default_model.clone())
            .with_retry(RetryPolicy::from_config(&config.retry))
            .with_key_style(config.framing.key_style))
    }

    pub fn with_default_model(mut self, model: Option<String>) -> Self {
        self.default_model = model;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_key_style(mut self, style: KeyStyle) -> Self {
        self.normalizer = KeyNormalizer::new(style);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn providers(&self) -> &[Arc<dyn LlmProvider>] {
        &self.providers
    }

    /// Todos os modelos, indexados pela chave normalizada.
    pub fn available_models(&self) -> AvailableModels {
        let mut models = AvailableModels::new();
        for provider in &self.providers {
            for model in provider.models() {
                let key = self.normalizer.normalize_key(model).to_ascii_lowercase();
                models.entry(key).or_insert_with(|| ModelSummary {
                    id: model.clone(),
                    provider: provider.name().to_string(),
                    display_name: format!("{} ({})", model, provider.display_name()),
                });
            }
        }
        models
    }

    /// Resolve o modelo pedido pelo cliente.
    ///
    /// Aceita o id exato, o id sem distinção de caixa ou a chave normalizada
    /// de qualquer estilo. Sem pedido, usa o modelo padrão configurado e,
    /// na falta dele, o primeiro disponível.
    pub fn resolve(&self, requested: Option<&str>) -> CriticaResult<ResolvedModel> {
        if self.providers.is_empty() {
            return Err(CriticaError::NoProviderConfigured);
        }

        match requested.map(str::trim).filter(|r| !r.is_empty()) {
            Some(name) => self
                .find(name)
                .ok_or_else(|| CriticaError::ModelNotFound(name.to_string())),
            None => {
                if let Some(resolved) = self.default_model.as_deref().and_then(|m| self.find(m)) {
                    return Ok(resolved);
                }
                self.providers
                    .iter()
                    .find_map(|p| {
                        p.models().first().map(|m| ResolvedModel {
                            provider: Arc::clone(p),
                            model: m.clone(),
                        })
                    })
                    .ok_or(CriticaError::NoProviderConfigured)
            }
        }
    }

    fn find(&self, name: &str) -> Option<ResolvedModel> {
        let candidates = || {
            self.providers
                .iter()
                .flat_map(|p| p.models().iter().map(move |m| (p, m)))
        };
        let resolved = |(p, m): (&Arc<dyn LlmProvider>, &String)| ResolvedModel {
            provider: Arc::clone(p),
            model: m.clone(),
        };

        if let Some(hit) = candidates().find(|(_, m)| m.as_str() == name) {
            return Some(resolved(hit));
        }
        if let Some(hit) = candidates().find(|(_, m)| m.eq_ignore_ascii_case(name)) {
            return Some(resolved(hit));
        }

        let wanted = name.to_ascii_lowercase();
        let styles = [KeyNormalizer::new(KeyStyle::Underscore), KeyNormalizer::new(KeyStyle::Spelled)];
        candidates()
            .find(|(_, m)| {
                styles
                    .iter()
                    .any(|s| s.normalize_key(m).to_ascii_lowercase() == wanted)
            })
            .map(resolved)
    }

    /// Envia o prompt ao modelo resolvido, com a política de retentativas.
    pub async fn complete(
        &self,
        resolved: &ResolvedModel,
        prompt: &Prompt,
    ) -> CriticaResult<Completion> {
        let label = format!("{}/{}", resolved.provider.name(), resolved.model);
        let provider: &dyn LlmProvider = resolved.provider.as_ref();
        let model: &str = &resolved.model;
        let completion = self
            .retry
            .run(&label, move |_| provider.complete(model, prompt))
            .await?;
        debug!(
            model = %completion.model,
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            "Completion received"
        );
        Ok(completion)
    }
}

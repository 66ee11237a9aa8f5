//! Tipos de erro do Critica.

use thiserror::Error;

use crate::providers::ProviderError;

/// Tipo de resultado padrão do Critica.
pub type CriticaResult<T> = Result<T, CriticaError>;

/// Erros possíveis no Critica.
///
/// A camada de framing (sanitizer, normalizer, framer) nunca produz erros:
/// ela devolve valores e registra diagnósticos. Os erros abaixo cobrem
/// configuração, provedores, sessões e I/O.
#[derive(Error, Debug)]
pub enum CriticaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("No LLM provider configured (set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY)")]
    NoProviderConfigured,

    #[error("Model '{0}' is not available")]
    ModelNotFound(String),

    #[error("Session '{0}' not found")]
    SessionNotFound(String),

    #[error("Session limit reached ({0})")]
    SessionLimit(usize),

    #[error("Failed to collect git diff: {0}")]
    GitDiff(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

impl CriticaError {
    /// Cria um erro genérico.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Cria um erro de configuração.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Cria um erro de transporte.
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }
}

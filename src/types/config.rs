//! Configuration for Critica.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::framing::KeyStyle;
use crate::providers::Backoff;
use crate::types::errors::CriticaResult;

/// Main configuration for Critica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Server and transport settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// JSON repair and key normalization settings.
    #[serde(default)]
    pub framing: FramingConfig,

    /// LLM provider settings.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Retry policy around provider calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Review tool settings.
    #[serde(default)]
    pub review: ReviewConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Transport the server listens on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Newline-delimited JSON-RPC over stdin/stdout.
    #[default]
    Stdio,
    /// Streamable HTTP (`/mcp`) plus the legacy SSE endpoints.
    Http,
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" | "sse" | "streamable-http" => Ok(Self::Http),
            other => Err(format!("unknown transport '{}' (expected stdio or http)", other)),
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Stdio => write!(f, "stdio"),
            TransportMode::Http => write!(f, "http"),
        }
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Default transport.
    #[serde(default)]
    pub transport: TransportMode,

    /// Bind address for the HTTP transport.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the HTTP transport.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind attempts before giving up.
    #[serde(default = "default_bind_attempts")]
    pub bind_attempts: u32,

    /// Delay between bind attempts (in milliseconds).
    #[serde(default = "default_bind_retry_delay_ms")]
    pub bind_retry_delay_ms: u64,

    /// Maximum number of concurrent HTTP/SSE sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// SSE keep-alive interval (in seconds).
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Idle time before an HTTP session without an open stream expires
    /// (in seconds, 0 disables expiry).
    #[serde(default = "default_session_idle_timeout")]
    pub session_idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: TransportMode::default(),
            host: default_host(),
            port: default_port(),
            bind_attempts: default_bind_attempts(),
            bind_retry_delay_ms: default_bind_retry_delay_ms(),
            max_sessions: default_max_sessions(),
            keep_alive_secs: default_keep_alive(),
            session_idle_timeout_secs: default_session_idle_timeout(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_bind_attempts() -> u32 {
    3
}

fn default_bind_retry_delay_ms() -> u64 {
    1000
}

fn default_max_sessions() -> usize {
    256
}

fn default_keep_alive() -> u64 {
    15
}

fn default_session_idle_timeout() -> u64 {
    1800
}

/// JSON repair and key normalization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramingConfig {
    /// Apply the repair rules to malformed JSON.
    #[serde(default = "default_true")]
    pub repair: bool,

    /// Normalize outgoing map keys to `[A-Za-z0-9_]`.
    #[serde(default = "default_true")]
    pub normalize_keys: bool,

    /// Key normalization style.
    #[serde(default)]
    pub key_style: KeyStyle,

    /// Upper bound for a single connection's partial-message buffer.
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            repair: true,
            normalize_keys: true,
            key_style: KeyStyle::default(),
            max_buffer_bytes: default_max_buffer_bytes(),
        }
    }
}

fn default_max_buffer_bytes() -> usize {
    4 * 1024 * 1024
}

/// Settings for every supported provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Google Gemini.
    #[serde(default = "ProviderConfig::gemini")]
    pub gemini: ProviderConfig,

    /// OpenAI.
    #[serde(default = "ProviderConfig::openai")]
    pub openai: ProviderConfig,

    /// Anthropic.
    #[serde(default = "ProviderConfig::anthropic")]
    pub anthropic: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            gemini: ProviderConfig::gemini(),
            openai: ProviderConfig::openai(),
            anthropic: ProviderConfig::anthropic(),
        }
    }
}

/// Configuration for a specific provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API key. Usually left empty and read from the environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variables checked (in order) for the API key.
    #[serde(default)]
    pub api_key_env: Vec<String>,

    /// API base URL.
    pub base_url: String,

    /// Models exposed through this provider.
    #[serde(default)]
    pub models: Vec<String>,

    /// Request timeout (in seconds).
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Maximum output tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl ProviderConfig {
    /// Creates a provider configuration.
    pub fn new(base_url: &str, api_key_env: &[&str], models: &[&str]) -> Self {
        Self {
            enabled: true,
            api_key: None,
            api_key_env: api_key_env.iter().map(|s| s.to_string()).collect(),
            base_url: base_url.to_string(),
            models: models.iter().map(|s| s.to_string()).collect(),
            timeout_secs: default_provider_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    /// Default Gemini configuration.
    pub fn gemini() -> Self {
        Self::new(
            "https://generativelanguage.googleapis.com",
            &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            &["gemini-1.5-pro", "gemini-1.5-flash", "gemini-2.0-flash"],
        )
    }

    /// Default OpenAI configuration.
    pub fn openai() -> Self {
        Self::new(
            "https://api.openai.com/v1",
            &["OPENAI_API_KEY"],
            &["gpt-4o", "gpt-4o-mini", "o3-mini"],
        )
    }

    /// Default Anthropic configuration.
    pub fn anthropic() -> Self {
        Self::new(
            "https://api.anthropic.com",
            &["ANTHROPIC_API_KEY"],
            &["claude-3-5-sonnet-20241022", "claude-3-5-haiku-20241022"],
        )
    }

    /// Sets the API key directly.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Returns the API key if one is configured and not blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Whether this provider can be used.
    pub fn is_usable(&self) -> bool {
        self.enabled && self.api_key().is_some() && !self.models.is_empty()
    }
}

fn default_provider_timeout() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

fn default_true() -> bool {
    true
}

/// Retry policy around provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (in milliseconds).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay (in milliseconds).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Fixed or exponential delay.
    #[serde(default)]
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: Backoff::default(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

/// LRU cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum cache capacity (number of entries).
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Entry time to live in seconds.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_capacity() -> usize {
    256
}

fn default_cache_ttl() -> u64 {
    600 // 10 minutes
}

/// Review tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Model used when a request does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Largest accepted `code` argument (in bytes).
    #[serde(default = "default_max_code_bytes")]
    pub max_code_bytes: usize,

    /// Timeout for `git diff` (in seconds).
    #[serde(default = "default_git_timeout")]
    pub git_diff_timeout_secs: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            max_code_bytes: default_max_code_bytes(),
            git_diff_timeout_secs: default_git_timeout(),
        }
    }
}

fn default_max_code_bytes() -> usize {
    512 * 1024
}

fn default_git_timeout() -> u64 {
    15
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> CriticaResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> CriticaResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Creates default configuration.
    pub fn default_config() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            framing: FramingConfig::default(),
            providers: ProvidersConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            review: ReviewConfig::default(),
        }
    }

    /// Tries to load configuration from the current directory, then from
    /// the user config directory, or falls back to the defaults.
    pub fn load_or_default() -> Self {
        if let Ok(config) = Self::load("critica.toml") {
            return config;
        }
        dirs::config_dir()
            .map(|dir| dir.join("critica").join("critica.toml"))
            .and_then(|path| Self::load(path).ok())
            .unwrap_or_else(Self::default_config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides using the given variable lookup.
    ///
    /// Recognized: `PORT`, `HOST`, `LOG_LEVEL`, `CRITICA_DEFAULT_MODEL` and
    /// each provider's `api_key_env` list. A key already present in the
    /// file wins over the environment.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(port) = lookup("PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PORT"),
            }
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.general.log_level = level.to_ascii_lowercase();
        }
        if let Some(model) = lookup("CRITICA_DEFAULT_MODEL") {
            self.review.default_model = Some(model);
        }

        for (name, provider) in self.providers.iter_mut() {
            if provider.api_key().is_some() {
                continue;
            }
            provider.api_key = if provider.api_key_env.is_empty() {
                default_key_env(name).iter().find_map(|var| lookup(*var))
            } else {
                provider.api_key_env.iter().find_map(|var| lookup(var.as_str()))
            };
        }
    }
}

impl ProvidersConfig {
    /// Iterates over `(name, config)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ProviderConfig)> {
        [
            ("gemini", &self.gemini),
            ("openai", &self.openai),
            ("anthropic", &self.anthropic),
        ]
        .into_iter()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = (&'static str, &mut ProviderConfig)> {
        [
            ("gemini", &mut self.gemini),
            ("openai", &mut self.openai),
            ("anthropic", &mut self.anthropic),
        ]
        .into_iter()
    }

    /// Whether at least one provider is usable.
    pub fn any_usable(&self) -> bool {
        self.iter().any(|(_, p)| p.is_usable())
    }
}

fn default_key_env(provider: &str) -> &'static [&'static str] {
    match provider {
        "gemini" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        "anthropic" => &["ANTHROPIC_API_KEY"],
        _ => &[],
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

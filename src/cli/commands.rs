//! Implementação dos comandos CLI do Critica.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::framing::{Frame, MessageCodec, MessageFramer, SanitizingCodec};
use crate::providers::ProviderRegistry;
use crate::types::config::{Config, FramingConfig, TransportMode};
use crate::{CriticaError, CriticaResult};

/// Cria `critica.toml` no diretório indicado.
pub async fn init(path: Option<PathBuf>) -> CriticaResult<()> {
    let target_dir = path.unwrap_or_else(|| PathBuf::from("."));

    if !target_dir.exists() {
        std::fs::create_dir_all(&target_dir)?;
        tracing::info!("Directory created: {}", target_dir.display());
    }

    let config_path = target_dir.join("critica.toml");

    if config_path.exists() {
        println!("Configuration already exists at: {}", config_path.display());
        return Ok(());
    }

    Config::default_config().save(&config_path)?;

    println!("Critica initialized successfully!");
    println!("Configuration created at: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Export an API key: GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY");
    println!("  2. Check the providers: critica status");
    println!("  3. Add to your MCP client: critica serve");

    Ok(())
}

/// Inicia o servidor MCP.
pub async fn serve(
    transport: Option<TransportMode>,
    host: Option<String>,
    port: Option<u16>,
    config: &Config,
) -> CriticaResult<()> {
    let mut config = config.clone();
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let transport = transport.unwrap_or(config.server.transport);

    tracing::debug!(
        transport = %transport,
        repair = config.framing.repair,
        normalize_keys = config.framing.normalize_keys,
        "Serve configuration"
    );

    match transport {
        TransportMode::Stdio => {
            let server = crate::mcp::McpServer::new(&config)?;
            tokio::select! {
                result = server.run() => result,
                _ = crate::mcp::shutdown_signal() => Ok(()),
            }
        }
        TransportMode::Http => serve_http(&config).await,
    }
}

#[cfg(feature = "http")]
async fn serve_http(config: &Config) -> CriticaResult<()> {
    crate::mcp::HttpServer::new(config)?.run().await
}

#[cfg(not(feature = "http"))]
async fn serve_http(_config: &Config) -> CriticaResult<()> {
    Err(CriticaError::config(
        "this build does not include the http transport (enable the 'http' feature)",
    ))
}

/// Mostra provedores, transporte e cache.
pub async fn status(config: &Config) -> CriticaResult<()> {
    println!("Critica {}\n", env!("CARGO_PKG_VERSION"));

    println!("Providers:");
    for (name, provider) in config.providers.iter() {
        let state = if !provider.enabled {
            "○ disabled"
        } else if provider.api_key().is_some() {
            "✓ ready"
        } else {
            "✗ no API key"
        };
        println!("  {} {} ({} models)", state, name, provider.models.len());
    }

    println!();
    println!("Server:");
    println!("  transport: {}", config.server.transport);
    println!("  http: {}:{}", config.server.host, config.server.port);
    println!("  max sessions: {}", config.server.max_sessions);

    println!();
    println!("Framing:");
    println!("  repair: {}", config.framing.repair);
    println!(
        "  normalize keys: {} ({:?})",
        config.framing.normalize_keys, config.framing.key_style
    );

    println!();
    if config.cache.enabled {
        println!(
            "Cache: {} entries, ttl {}s",
            config.cache.capacity, config.cache.ttl_secs
        );
    } else {
        println!("Cache: disabled");
    }

    if !config.providers.any_usable() {
        println!();
        println!("No provider has an API key; 'critica serve' will refuse to start.");
    }

    Ok(())
}

/// Lista os modelos dos provedores com API key.
pub async fn models(config: &Config) -> CriticaResult<()> {
    let registry = ProviderRegistry::from_config(config)?;
    if registry.is_empty() {
        println!("No provider configured. Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY.");
        return Ok(());
    }

    for (key, model) in registry.available_models() {
        println!("  {:<32} {} [{}]", key, model.id, model.provider);
    }
    Ok(())
}

/// Repara o JSON lido de `file` (ou stdin) e escreve o resultado em stdout.
pub async fn repair(file: Option<&Path>, config: &Config) -> CriticaResult<()> {
    let input = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let (repaired, failures) = repair_text(&input, &config.framing);
    for line in &repaired {
        println!("{}", line);
    }

    if failures > 0 {
        return Err(CriticaError::other(format!(
            "{} unit(s) could not be repaired",
            failures
        )));
    }
    Ok(())
}

/// Enquadra e repara `input`. Devolve uma linha por documento e o número
/// de unidades que nenhuma regra conseguiu reparar.
pub fn repair_text(input: &str, framing: &FramingConfig) -> (Vec<String>, usize) {
    let codec = SanitizingCodec::from_config(framing);
    let mut framer = MessageFramer::new(framing.max_buffer_bytes);
    framer.push(input);
    framer.flush();

    let mut lines = Vec::new();
    let mut failures = 0;
    for frame in framer.drain() {
        match frame {
            Frame::Passthrough(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    lines.push(text.to_string());
                }
            }
            Frame::Unit(unit) => {
                for message in codec.decode(&unit) {
                    if let Some(error) = &message.error {
                        tracing::warn!(error = %error, "Unit could not be repaired");
                        failures += 1;
                    } else if message.was_repaired() {
                        tracing::debug!(rules = ?message.repairs, "Repaired");
                    }
                    lines.push(message.text);
                }
            }
        }
    }
    (lines, failures)
}

/// Mostra versão.
pub fn version() {
    println!("critica {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("MCP code review server with a repairing JSON-RPC transport");
    println!("https://github.com/SamoraDC/critica");
}

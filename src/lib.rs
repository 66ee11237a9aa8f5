//! # Critica
//!
//! Servidor MCP de revisão de código apoiado em provedores LLM.
//!
//! O núcleo é a camada de transporte: cada mensagem JSON-RPC recebida é
//! enquadrada, reparada e normalizada antes do despacho, então clientes que
//! enviam JSON levemente inválido continuam sendo atendidos.
//!
//! ## Módulos
//!
//! - [`cli`] - Interface de linha de comando
//! - [`mcp`] - Servidor MCP (stdio, streamable HTTP e SSE legado)
//! - [`framing`] - Sanitizer, normalizador de chaves, framer e codec
//! - [`providers`] - Provedores LLM (Gemini, OpenAI, Anthropic)
//! - [`review`] - Prompts, parsing das respostas e `git diff`
//! - [`cache`] - Cache LRU para resultados de revisão
//! - [`types`] - Tipos compartilhados

pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod framing;
pub mod mcp;
pub mod providers;
pub mod review;
pub mod types;

pub use types::config::Config;
pub use types::errors::{CriticaError, CriticaResult};

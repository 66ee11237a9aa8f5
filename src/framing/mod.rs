//! Camada de framing e reparo de JSON.
//!
//! - [`Sanitizer`] - repara JSON malformado com regras ordenadas
//! - [`KeyNormalizer`] - normaliza chaves de payloads de saída
//! - [`MessageFramer`] - acumula fragmentos até formar unidades completas
//! - [`MessageCodec`] - codec injetável usado pelo transporte
//!
//! Nada aqui devolve erro ou entra em pânico: falhas viram valores e logs.

mod codec;
mod framer;
mod normalizer;
pub mod rules;
mod sanitizer;

pub use codec::{Message, MessageCodec, SanitizingCodec};
pub use framer::{frame_line, Frame, FrameState, MessageFramer};
pub use normalizer::{KeyNormalizer, KeyStyle};
pub use rules::{builtin_rules, RepairRule, Replacement, Scope};
pub use sanitizer::{sanitize, Repair, RepairOutcome, Sanitizer};

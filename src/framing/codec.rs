//! Codec de mensagens injetável.
//!
//! O transporte recebe um [`MessageCodec`] explícito em vez de depender de
//! um serializador global.

use serde_json::Value;
use std::sync::Arc;

use super::normalizer::KeyNormalizer;
use super::sanitizer::{RepairOutcome, Sanitizer};
use crate::types::config::FramingConfig;

/// Uma mensagem decodificada (ou a tentativa de decodificá-la).
#[derive(Debug, Clone)]
pub struct Message {
    /// Texto recebido do canal.
    pub raw: String,
    /// Texto após o reparo.
    pub text: String,
    /// Valor parseado, se o texto for JSON válido.
    pub parsed: Option<Value>,
    /// Regras aplicadas.
    pub repairs: Vec<&'static str>,
    /// Erro de parse, se houver.
    pub error: Option<String>,
}

impl Message {
    pub fn was_repaired(&self) -> bool {
        !self.repairs.is_empty()
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed.is_some()
    }
}

/// Codificação de mensagens de saída e decodificação das de entrada.
pub trait MessageCodec: Send + Sync {
    /// Serializa um valor em uma única mensagem de texto.
    fn encode(&self, value: Value) -> Result<String, serde_json::Error>;

    /// Decodifica uma unidade vinda do framer. Uma unidade pode conter
    /// mais de um documento; falhas são devolvidas com `error` preenchido.
    fn decode(&self, raw: &str) -> Vec<Message>;
}

/// Codec padrão: normaliza chaves na saída e repara JSON na entrada.
#[derive(Debug, Clone, Default)]
pub struct SanitizingCodec {
    sanitizer: Sanitizer,
    normalizer: Option<KeyNormalizer>,
}

impl SanitizingCodec {
    pub fn new(sanitizer: Sanitizer, normalizer: Option<KeyNormalizer>) -> Self {
        Self {
            sanitizer,
            normalizer,
        }
    }

    pub fn from_config(config: &FramingConfig) -> Self {
        let sanitizer = if config.repair {
            Sanitizer::default()
        } else {
            Sanitizer::disabled()
        };
        let normalizer = config
            .normalize_keys
            .then(|| KeyNormalizer::new(config.key_style));
        Self::new(sanitizer, normalizer)
    }

    /// Codec compartilhável entre sessões.
    pub fn shared(config: &FramingConfig) -> Arc<dyn MessageCodec> {
        Arc::new(Self::from_config(config))
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }
}

impl MessageCodec for SanitizingCodec {
    fn encode(&self, value: Value) -> Result<String, serde_json::Error> {
        let value = match &self.normalizer {
            Some(normalizer) => normalizer.normalize_value(value),
            None => value,
        };
        let text = serde_json::to_string(&value)?;
        Ok(self.sanitizer.sanitize(&text))
    }

    fn decode(&self, raw: &str) -> Vec<Message> {
        let repair = self.sanitizer.repair(raw);

        match repair.outcome {
            RepairOutcome::AlreadyValid | RepairOutcome::Repaired => {
                let (parsed, error) = match serde_json::from_str::<Value>(&repair.text) {
                    Ok(value) => (Some(value), None),
                    Err(e) => (None, Some(e.to_string())),
                };
                vec![Message {
                    raw: raw.to_string(),
                    text: repair.text,
                    parsed,
                    repairs: repair.applied,
                    error,
                }]
            }
            RepairOutcome::Split => serde_json::Deserializer::from_str(&repair.text)
                .into_iter::<Value>()
                .map(|item| match item {
                    Ok(value) => Message {
                        raw: raw.to_string(),
                        text: value.to_string(),
                        parsed: Some(value),
                        repairs: repair.applied.clone(),
                        error: None,
                    },
                    Err(e) => Message {
                        raw: raw.to_string(),
                        text: repair.text.clone(),
                        parsed: None,
                        repairs: repair.applied.clone(),
                        error: Some(e.to_string()),
                    },
                })
                .collect(),
            RepairOutcome::Unrepaired => {
                let error = serde_json::from_str::<Value>(&repair.text)
                    .err()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "invalid JSON".to_string());
                vec![Message {
                    raw: raw.to_string(),
                    text: repair.text,
                    parsed: None,
                    repairs: repair.applied,
                    error: Some(error),
                }]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::KeyStyle;
    use serde_json::json;

    #[test]
    fn test_decode_valid() {
        let codec = SanitizingCodec::default();
        let messages = codec.decode(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].was_repaired());
        assert_eq!(messages[0].parsed.as_ref().unwrap()["method"], "ping");
    }

    #[test]
    fn test_decode_repaired() {
        let codec = SanitizingCodec::default();
        let messages = codec.decode(r#"{"jsonrpc":"2.0","id":1,"method":"x","params":{"a":["b" "c"]}}"#);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].was_repaired());
        assert_eq!(
            messages[0].parsed.as_ref().unwrap()["params"]["a"],
            json!(["b", "c"])
        );
    }

    #[test]
    fn test_decode_split() {
        let codec = SanitizingCodec::default();
        let messages = codec.decode(r#"{"id":1}{"id":2}"#);
        let ids: Vec<_> = messages
            .iter()
            .map(|m| m.parsed.as_ref().unwrap()["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_decode_failure_keeps_raw() {
        let codec = SanitizingCodec::default();
        let messages = codec.decode("{definitely not json");
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].is_parsed());
        assert_eq!(messages[0].raw, "{definitely not json");
        assert!(messages[0].error.is_some());
    }

    #[test]
    fn test_encode_normalizes_keys() {
        let codec = SanitizingCodec::from_config(&FramingConfig {
            key_style: KeyStyle::Spelled,
            ..FramingConfig::default()
        });
        let text = codec.encode(json!({"gemini-1.5-pro": {"id": "gemini-1.5-pro"}})).unwrap();
        assert_eq!(text, r#"{"gemini_1dot5_pro":{"id":"gemini-1.5-pro"}}"#);
    }

    #[test]
    fn test_encode_without_normalization() {
        let codec = SanitizingCodec::from_config(&FramingConfig {
            normalize_keys: false,
            ..FramingConfig::default()
        });
        let text = codec.encode(json!({"a-b": 1})).unwrap();
        assert_eq!(text, r#"{"a-b":1}"#);
    }
}

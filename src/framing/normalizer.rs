//! Normalização de chaves de payloads de saída.
//!
//! Substitui caracteres fora de `[A-Za-z0-9_]` nas chaves de objetos,
//! recursivamente. O mapeamento é de mão única e pode colidir
//! (`a-b` e `a.b` viram `a_b`): colisões são registradas em `warn` e a
//! última chave vence.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use tracing::{error, warn};

/// Estilo de normalização.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyStyle {
    /// `gemini-1.5-pro` → `gemini_1_5_pro`
    #[default]
    Underscore,
    /// `gemini-1.5-pro` → `gemini_1dot5_pro`
    Spelled,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyNormalizer {
    style: KeyStyle,
}

impl KeyNormalizer {
    pub fn new(style: KeyStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> KeyStyle {
        self.style
    }

    /// Normaliza uma chave. Chaves já seguras são devolvidas sem cópia.
    pub fn normalize_key<'k>(&self, key: &'k str) -> Cow<'k, str> {
        if key.chars().all(is_safe) {
            return Cow::Borrowed(key);
        }

        let mut out = String::with_capacity(key.len() + 4);
        for c in key.chars() {
            match c {
                c if is_safe(c) => out.push(c),
                '.' if self.style == KeyStyle::Spelled => out.push_str("dot"),
                _ => out.push('_'),
            }
        }
        Cow::Owned(out)
    }

    /// Normaliza as chaves de um valor JSON, recursivamente.
    pub fn normalize_value(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.normalize_map(map)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.normalize_value(v)).collect())
            }
            scalar => scalar,
        }
    }

    fn normalize_map(&self, map: Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::with_capacity(map.len());
        for (key, value) in map {
            let normalized = self.normalize_key(&key).into_owned();
            let value = self.normalize_value(value);
            if out.insert(normalized.clone(), value).is_some() {
                warn!(
                    original = %key,
                    normalized = %normalized,
                    "Key collision after normalization, keeping last value"
                );
            }
        }
        out
    }

    /// Converte qualquer valor serializável e normaliza as chaves.
    ///
    /// Valores que não podem ser representados como JSON (ex.: mapas com
    /// chaves não textuais) viram `null`.
    pub fn normalize<T: Serialize + ?Sized>(&self, value: &T) -> Value {
        match serde_json::to_value(value) {
            Ok(value) => self.normalize_value(value),
            Err(e) => {
                error!(error = %e, "Payload cannot be represented as JSON, replacing with null");
                Value::Null
            }
        }
    }
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

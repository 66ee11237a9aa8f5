//! Cache LRU para resultados de revisão.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::requests::{ProjectContext, ReviewKind};
use crate::types::responses::StructuredReview;

/// Conteúdo de uma revisão em cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedReview {
    Structured(StructuredReview),
    Freeform(String),
}

/// Revisão em cache.
#[derive(Debug, Clone)]
pub struct CachedResult {
    /// Revisão.
    pub review: CachedReview,

    /// Modelo que produziu a revisão.
    pub model: String,

    /// Momento em que foi cacheado.
    pub cached_at: DateTime<Utc>,
}

impl CachedResult {
    /// Cria um novo resultado em cache.
    pub fn new(review: CachedReview, model: impl Into<String>) -> Self {
        Self {
            review,
            model: model.into(),
            cached_at: Utc::now(),
        }
    }

    /// Verifica se o cache expirou.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        let elapsed = Utc::now()
            .signed_duration_since(self.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        elapsed >= ttl
    }
}

/// Estatísticas do cache.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Número atual de entradas.
    pub size: usize,

    /// Capacidade máxima.
    pub capacity: usize,

    /// Número de acertos (cache hits).
    pub hits: u64,

    /// Número de erros (cache misses).
    pub misses: u64,
}

impl CacheStats {
    /// Calcula a taxa de acerto.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// O que identifica uma revisão.
#[derive(Debug, Clone, Copy)]
pub struct CacheKeyParts<'a> {
    pub code: &'a str,
    pub language: &'a str,
    pub model: &'a str,
    pub kind: ReviewKind,
    pub context: Option<&'a ProjectContext>,
    pub diff: Option<&'a str>,
}

/// Cache LRU com TTL para revisões.
pub struct ReviewCache {
    cache: LruCache<String, CachedResult>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ReviewCache {
    /// Cria um novo cache.
    ///
    /// # Argumentos
    /// - `capacity`: Número máximo de entradas (mínimo 1)
    /// - `ttl`: Tempo de vida das entradas
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(cap),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Gera a chave de cache.
    ///
    /// SHA256 do código normalizado, linguagem, modelo, tipo de revisão,
    /// contexto do projeto e diff.
    pub fn cache_key(parts: &CacheKeyParts<'_>) -> String {
        let code = Self::normalize_code(parts.code);
        let kind = parts.kind.to_string();

        let mut hasher = Sha256::new();
        for field in [code.as_str(), parts.language, parts.model, kind.as_str()] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        if let Some(context) = parts.context {
            // ProjectContext sempre serializa.
            hasher.update(serde_json::to_vec(context).unwrap_or_default());
        }
        hasher.update([0u8]);
        if let Some(diff) = parts.diff {
            hasher.update(diff.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Normaliza código para cache (remove whitespace extra).
    fn normalize_code(code: &str) -> String {
        code.lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Busca no cache.
    ///
    /// Retorna `None` se não encontrado ou se expirado.
    pub fn get(&mut self, key: &str) -> Option<&CachedResult> {
        let is_expired = self.cache.peek(key).map(|c| c.is_expired(self.ttl));

        match is_expired {
            Some(true) => {
                self.cache.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(false) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.cache.get(key)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insere no cache.
    pub fn insert(&mut self, key: String, result: CachedResult) {
        self.cache.put(key, result);
    }

    /// Limpa todo o cache.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Retorna estatísticas do cache.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.cache.len(),
            capacity: self.cache.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

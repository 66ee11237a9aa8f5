//! Cache LRU para resultados de revisão.
//!
//! Evita chamar o provedor de novo para o mesmo código, modelo e contexto
//! enquanto a entrada estiver dentro do TTL.

mod lru;

pub use lru::{CacheKeyParts, CacheStats, CachedResult, CachedReview, ReviewCache};

//! In-process cache for fused retrieval results.
//!
//! Keyed by a SHA-256 fingerprint of (`query`, `vector_weight`, `keyword_weight`,
//! `top_k`). LRU eviction with TTL; one explicit instance per retriever, no
//! process-wide state.

mod key;
mod store;

pub use key::CacheKey;
pub use store::{CacheStats, QueryCache};

//! Cache key: SHA-256 fingerprint of (query, retrieval config).

use std::fmt;

use sha2::{Digest, Sha256};

use crate::types::RetrievalConfig;

const KEY_VERSION: &[u8] = b"omni-retrieval:v1";

/// Deterministic digest of a `(query, config)` pair.
///
/// Fields are length-prefixed and the weights hashed by bit pattern, so no
/// two distinct pairs share an encoding (e.g. `top_k` 1 vs 10 never alias).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Fingerprint `query` under `config`.
    #[must_use]
    pub fn new(query: &str, config: &RetrievalConfig) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(KEY_VERSION);
        hasher.update((query.len() as u64).to_le_bytes());
        hasher.update(query.as_bytes());
        hasher.update(weight_bits(config.vector_weight).to_le_bytes());
        hasher.update(weight_bits(config.keyword_weight).to_le_bytes());
        hasher.update((config.top_k as u64).to_le_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `-0.0` and `0.0` are the same weight.
fn weight_bits(weight: f32) -> u32 {
    if weight == 0.0 { 0 } else { weight.to_bits() }
}

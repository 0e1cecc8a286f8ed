//! HybridRetriever - cache lookup, concurrent signal fetch, fusion, store.
//!
//! ```text
//! retrieve(query, config)
//!   ├── validate config          (InvalidConfig is the only caller-visible error)
//!   ├── QueryCache::get          HIT  -> return
//!   └── MISS
//!        ├── VectorIndex  ─┐     (both concurrent; a failed signal contributes nothing)
//!        ├── LexicalIndex ─┘
//!        ├── fuse
//!        ├── QueryCache::set     (only reached by calls that were not cancelled)
//!        └── return
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Context;

use crate::cache::{CacheStats, QueryCache};
use crate::error::RetrievalError;
use crate::fusion::fuse;
use crate::lexical::LexicalIndex;
use crate::settings::RetrievalSettings;
use crate::types::{Passage, RetrievalConfig, ScoredPassage, SignalOrigin};
use crate::vector::{CorpusProvider, VectorIndex, to_vector_candidates};

/// Hybrid (vector + keyword) retriever with a query cache.
///
/// Safe to share across tasks; concurrent misses for one key may both do the
/// fetch/fuse work, the cache stays consistent either way.
pub struct HybridRetriever {
    vector: Arc<dyn VectorIndex>,
    lexical: Arc<LexicalIndex>,
    cache: QueryCache,
    default_config: RwLock<RetrievalConfig>,
    candidate_multiplier: usize,
}

impl HybridRetriever {
    /// Create a retriever with an empty lexical index and a cache built from `settings`.
    #[must_use]
    pub fn new(vector: Arc<dyn VectorIndex>, settings: RetrievalSettings) -> Self {
        let cache = QueryCache::new(settings.cache.clone());
        Self::from_parts(vector, Arc::new(LexicalIndex::new()), cache, &settings)
    }

    /// Create a retriever from explicit parts.
    #[must_use]
    pub fn from_parts(
        vector: Arc<dyn VectorIndex>,
        lexical: Arc<LexicalIndex>,
        cache: QueryCache,
        settings: &RetrievalSettings,
    ) -> Self {
        Self {
            vector,
            lexical,
            cache,
            default_config: RwLock::new(settings.default_config),
            candidate_multiplier: settings.candidate_multiplier.max(1),
        }
    }

    /// Retrieve the fused top-`k` passages for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidConfig`] when `config` fails validation.
    /// Signal and cache failures never surface here.
    pub async fn retrieve(
        &self,
        query: &str,
        config: RetrievalConfig,
    ) -> Result<Vec<ScoredPassage>, RetrievalError> {
        config.validate()?;

        if let Some(cached) = self.cache.get(query, &config) {
            return Ok(cached.to_vec());
        }

        let (vector, keyword) = self.fetch_signals(query, &config).await;
        let fused = fuse_signals(vector, keyword, &config);
        self.cache.set(query, &config, fused.clone());

        tracing::info!(
            event = "retrieval.hybrid.completed",
            returned = fused.len(),
            top_k = config.top_k,
            "hybrid retrieval completed"
        );
        Ok(fused)
    }

    /// Retrieve with the retriever's default config.
    ///
    /// # Errors
    ///
    /// See [`Self::retrieve`].
    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<ScoredPassage>, RetrievalError> {
        let config = self.default_config();
        self.retrieve(query, config).await
    }

    /// Current default config.
    #[must_use]
    pub fn default_config(&self) -> RetrievalConfig {
        *self
            .default_config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the default signal weights.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidConfig`] for a negative or non-finite weight.
    pub fn adjust_weights(&self, vector_weight: f32, keyword_weight: f32) -> Result<(), RetrievalError> {
        let mut guard = self
            .default_config
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let updated = RetrievalConfig {
            vector_weight,
            keyword_weight,
            ..*guard
        };
        updated.validate()?;
        *guard = updated;
        tracing::info!(
            event = "retrieval.weights.adjusted",
            vector_weight,
            keyword_weight,
            "default retrieval weights adjusted"
        );
        Ok(())
    }

    /// Remove cached results for exactly `query` (all configs).
    pub fn invalidate(&self, query: &str) -> usize {
        self.cache.invalidate(query)
    }

    /// Drop all cached results and reset cache counters.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Cache usage statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Rebuild the keyword index over the full corpus.
    ///
    /// In-flight retrievals finish on the snapshot they started with.
    pub fn rebuild_lexical_index(&self, passages: Vec<Passage>) {
        self.lexical.build(passages);
    }

    /// Reload the corpus from `provider` and rebuild the keyword index.
    ///
    /// Returns the number of passages indexed.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider fails; the previous index stays live.
    pub async fn refresh_from(&self, provider: &dyn CorpusProvider) -> anyhow::Result<usize> {
        let passages = provider
            .passages()
            .await
            .context("failed to load corpus for keyword index rebuild")?;
        let count = passages.len();
        self.rebuild_lexical_index(passages);
        Ok(count)
    }

    /// Shared keyword index.
    #[must_use]
    pub fn lexical(&self) -> &Arc<LexicalIndex> {
        &self.lexical
    }

    /// Query cache.
    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Close the retriever's cache; retrieval keeps working uncached.
    pub fn close(&self) {
        self.cache.close();
    }

    /// Fetch both signals concurrently, each asked for `top_k * multiplier` candidates.
    pub(crate) async fn fetch_signals(
        &self,
        query: &str,
        config: &RetrievalConfig,
    ) -> (Vec<ScoredPassage>, Vec<ScoredPassage>) {
        let k = config.top_k.saturating_mul(self.candidate_multiplier);
        tokio::join!(self.vector_candidates(query, k), self.keyword_candidates(query, k))
    }

    async fn vector_candidates(&self, query: &str, k: usize) -> Vec<ScoredPassage> {
        let outcome = self
            .vector
            .similarity_search(query, k)
            .await
            .map(to_vector_candidates)
            .map_err(|error| RetrievalError::signal("vector", format!("{error:#}")));
        signal_or_empty(SignalOrigin::Vector, outcome)
    }

    async fn keyword_candidates(&self, query: &str, k: usize) -> Vec<ScoredPassage> {
        let snapshot = self.lexical.snapshot();
        if snapshot.is_empty() {
            return Vec::new();
        }
        let text = query.to_string();
        let outcome = tokio::task::spawn_blocking(move || snapshot.try_query(&text, k))
            .await
            .map_err(|join_error| RetrievalError::signal("keyword", join_error))
            .and_then(|result| result);
        signal_or_empty(SignalOrigin::Keyword, outcome)
    }
}

/// A failed signal contributes no candidates; the failure is logged.
fn signal_or_empty(
    signal: SignalOrigin,
    outcome: Result<Vec<ScoredPassage>, RetrievalError>,
) -> Vec<ScoredPassage> {
    match outcome {
        Ok(candidates) => {
            tracing::debug!(
                event = "retrieval.signal.completed",
                signal = signal.as_str(),
                candidates = candidates.len(),
                "signal retrieval completed"
            );
            candidates
        }
        Err(error) => {
            tracing::warn!(
                event = "retrieval.signal.degraded",
                signal = signal.as_str(),
                error = %error,
                "signal retrieval failed; continuing without it"
            );
            Vec::new()
        }
    }
}

pub(crate) fn fuse_signals(
    vector: Vec<ScoredPassage>,
    keyword: Vec<ScoredPassage>,
    config: &RetrievalConfig,
) -> Vec<ScoredPassage> {
    fuse(
        vector,
        keyword,
        config.vector_weight,
        config.keyword_weight,
        config.top_k,
    )
}

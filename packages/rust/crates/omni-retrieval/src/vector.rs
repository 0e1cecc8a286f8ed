//! External collaborators: the dense vector index and the corpus provider.

use anyhow::Result;
use async_trait::async_trait;

use crate::fusion::distance_to_similarity;
use crate::types::{Passage, ScoredPassage, SignalOrigin};

/// Dense embedding index (embedding model + ANN store live behind this).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `k` passages with their distance to `query`, nearest first.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<(Passage, f32)>>;
}

/// Source of the full passage set used to (re)build the lexical index.
#[async_trait]
pub trait CorpusProvider: Send + Sync {
    /// Every passage currently in the corpus, in a stable order.
    async fn passages(&self) -> Result<Vec<Passage>>;
}

/// Convert `(passage, distance)` hits into vector-signal candidates.
///
/// Similarity is `1 - distance`; hits with a non-finite distance are dropped.
#[must_use]
pub fn to_vector_candidates(hits: Vec<(Passage, f32)>) -> Vec<ScoredPassage> {
    hits.into_iter()
        .filter_map(|(passage, distance)| {
            let similarity = distance_to_similarity(distance);
            if similarity.is_finite() {
                Some(ScoredPassage::new(passage, similarity, SignalOrigin::Vector))
            } else {
                tracing::debug!(
                    event = "retrieval.vector.hit.dropped",
                    distance,
                    "dropping vector hit with non-finite distance"
                );
                None
            }
        })
        .collect()
}

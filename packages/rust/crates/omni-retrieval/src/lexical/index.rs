//! LexicalIndex - in-memory TF-IDF index with cosine scoring.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rayon::prelude::*;

use crate::error::RetrievalError;
use crate::types::{Passage, ScoredPassage, SignalOrigin};

use super::tokenize::tokenize;

/// One immutable build of the lexical index.
///
/// Rows are L2-normalised TF-IDF vectors stored as per-term posting lists,
/// so cosine similarity is a sparse dot product.
#[derive(Debug, Default)]
pub struct LexicalSnapshot {
    passages: Vec<Passage>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    /// term id -> (passage index, normalised weight), passage index ascending
    postings: Vec<Vec<(usize, f64)>>,
}

impl LexicalSnapshot {
    /// Build a snapshot over `passages` (insertion order is preserved).
    #[must_use]
    pub fn build(passages: Vec<Passage>) -> Self {
        if passages.is_empty() {
            return Self::default();
        }

        let term_counts: Vec<HashMap<String, u32>> = passages
            .par_iter()
            .map(|passage| count_terms(tokenize(&passage.content)))
            .collect();

        // Term ids follow first appearance so builds are reproducible.
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: Vec<u32> = Vec::new();
        for counts in &term_counts {
            let mut ordered: Vec<&String> = counts.keys().collect();
            ordered.sort_unstable();
            for term in ordered {
                let next_id = vocabulary.len();
                let id = *vocabulary.entry(term.clone()).or_insert(next_id);
                if id == doc_freq.len() {
                    doc_freq.push(0);
                }
                doc_freq[id] += 1;
            }
        }

        let n_docs = to_f64(passages.len());
        let idf: Vec<f64> = doc_freq
            .iter()
            .map(|&df| ((1.0 + n_docs) / (1.0 + f64::from(df))).ln() + 1.0)
            .collect();

        let mut postings: Vec<Vec<(usize, f64)>> = vec![Vec::new(); idf.len()];
        for (doc_idx, counts) in term_counts.iter().enumerate() {
            let weights: BTreeMap<usize, f64> = counts
                .iter()
                .filter_map(|(term, &count)| {
                    let id = *vocabulary.get(term)?;
                    Some((id, f64::from(count) * idf[id]))
                })
                .collect();
            let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
            if norm <= 0.0 {
                continue;
            }
            for (id, weight) in weights {
                postings[id].push((doc_idx, weight / norm));
            }
        }

        Self {
            passages,
            vocabulary,
            idf,
            postings,
        }
    }

    /// Number of indexed passages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// True when no passage is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Number of distinct terms.
    #[must_use]
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Score every passage against `text`; return the `top_k` best with score > 0.
    ///
    /// Descending by cosine similarity, ties in corpus insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::SignalUnavailable`] when a similarity is not finite.
    #[allow(clippy::cast_possible_truncation)]
    pub fn try_query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredPassage>, RetrievalError> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        // BTreeMap keeps accumulation order fixed for identical queries.
        let mut query_weights: BTreeMap<usize, f64> = BTreeMap::new();
        for term in tokenize(text) {
            if let Some(&id) = self.vocabulary.get(&term) {
                *query_weights.entry(id).or_insert(0.0) += self.idf[id];
            }
        }
        let norm = query_weights.values().map(|w| w * w).sum::<f64>().sqrt();
        if norm <= 0.0 {
            return Ok(Vec::new());
        }

        let mut scores = vec![0.0_f64; self.passages.len()];
        for (id, weight) in &query_weights {
            let q = weight / norm;
            for &(doc_idx, doc_weight) in &self.postings[*id] {
                scores[doc_idx] += q * doc_weight;
            }
        }

        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(RetrievalError::signal(
                "keyword",
                format!("non-finite similarity {bad}"),
            ));
        }

        let mut ranked: Vec<(usize, f64)> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(top_k);

        Ok(ranked
            .into_iter()
            .map(|(doc_idx, score)| {
                ScoredPassage::new(
                    self.passages[doc_idx].clone(),
                    score as f32,
                    SignalOrigin::Keyword,
                )
            })
            .collect())
    }

    /// Infallible form of [`Self::try_query`]: failures degrade to an empty result.
    #[must_use]
    pub fn query(&self, text: &str, top_k: usize) -> Vec<ScoredPassage> {
        match self.try_query(text, top_k) {
            Ok(results) => results,
            Err(error) => {
                tracing::warn!(
                    event = "retrieval.lexical.query.degraded",
                    error = %error,
                    "keyword scoring failed; returning no keyword candidates"
                );
                Vec::new()
            }
        }
    }
}

/// Shared lexical index whose contents are swapped atomically on rebuild.
///
/// Readers take an `Arc` to the current snapshot and score without holding
/// the lock, so a query always sees one complete build.
#[derive(Debug, Default)]
pub struct LexicalIndex {
    current: RwLock<Arc<LexicalSnapshot>>,
    rebuild: Mutex<()>,
}

impl LexicalIndex {
    /// Create an empty (unbuilt) index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index already built over `passages`.
    #[must_use]
    pub fn with_passages(passages: Vec<Passage>) -> Self {
        let index = Self::new();
        index.build(passages);
        index
    }

    /// Rebuild from the full corpus, replacing the previous build in one swap.
    ///
    /// Concurrent calls are serialised.
    pub fn build(&self, passages: Vec<Passage>) {
        let _serial = self.rebuild.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = Arc::new(LexicalSnapshot::build(passages));
        tracing::info!(
            event = "retrieval.lexical.index.built",
            passages = snapshot.len(),
            vocabulary = snapshot.vocabulary_size(),
            "keyword index built"
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<LexicalSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Query the current snapshot; see [`LexicalSnapshot::query`].
    #[must_use]
    pub fn query(&self, text: &str, top_k: usize) -> Vec<ScoredPassage> {
        self.snapshot().query(text, top_k)
    }

    /// Number of passages in the current snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// True when the current snapshot is empty or nothing was built yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

fn count_terms(terms: Vec<String>) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for term in terms {
        *counts.entry(term).or_insert(0) += 1;
    }
    counts
}

#[allow(clippy::cast_precision_loss)]
fn to_f64(n: usize) -> f64 {
    n as f64
}

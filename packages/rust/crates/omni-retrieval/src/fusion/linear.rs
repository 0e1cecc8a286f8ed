//! Weighted linear fusion of the vector and keyword signal lists.

use std::collections::HashMap;

use crate::types::{ScoredPassage, SignalOrigin};

use super::kernels::weighted;

/// Merge two independently scored lists into one ranked list.
///
/// `fused = vector_weight * vector_score + keyword_weight * keyword_score`; a
/// passage missing from one list contributes 0 for that signal. Passages are
/// deduplicated on exact content and keep the first metadata seen (vector list
/// first). Output is descending by fused score, truncated to `top_k`, with ties
/// in first-encounter order.
///
/// Non-finite contributions are dropped before accumulating, and a passage
/// whose accumulated score overflows is dropped from the output.
#[must_use]
pub fn fuse(
    vector_results: Vec<ScoredPassage>,
    keyword_results: Vec<ScoredPassage>,
    vector_weight: f32,
    keyword_weight: f32,
    top_k: usize,
) -> Vec<ScoredPassage> {
    let capacity = vector_results.len() + keyword_results.len();
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(capacity);
    let mut fused: Vec<ScoredPassage> = Vec::with_capacity(capacity);

    let streams = [
        (vector_results, vector_weight, SignalOrigin::Vector),
        (keyword_results, keyword_weight, SignalOrigin::Keyword),
    ];
    for (results, weight, origin) in streams {
        for result in results {
            let contribution = weighted(result.score, weight);
            if !contribution.is_finite() {
                tracing::debug!(
                    event = "retrieval.fusion.contribution.dropped",
                    signal = origin.as_str(),
                    score = result.score,
                    weight,
                    "dropping non-finite fusion contribution"
                );
                continue;
            }
            if let Some(&slot) = slots.get(result.content()) {
                let entry = &mut fused[slot];
                entry.score += contribution;
                entry.origin = entry.origin.merge(origin);
            } else {
                slots.insert(result.passage.content.clone(), fused.len());
                fused.push(ScoredPassage::new(result.passage, contribution, origin));
            }
        }
    }

    let unique = fused.len();
    fused.retain(|entry| entry.score.is_finite());
    if fused.len() < unique {
        tracing::debug!(
            event = "retrieval.fusion.overflow.dropped",
            dropped = unique - fused.len(),
            "dropping passages whose fused score overflowed"
        );
    }
    // -0.0 + 0.0 == +0.0, so signed zeros tie under total_cmp.
    for entry in &mut fused {
        entry.score += 0.0;
    }
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused.truncate(top_k);

    tracing::debug!(
        event = "retrieval.fusion.completed",
        candidates = capacity,
        unique,
        returned = fused.len(),
        "signals fused"
    );
    fused
}

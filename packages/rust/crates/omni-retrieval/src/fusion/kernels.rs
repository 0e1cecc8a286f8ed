//! Compute kernels for fusion: weighted signal term and distance→similarity.
//!
//! Single swap-in points for the formulas.

/// Weighted contribution of one signal score: `weight * score`.
#[inline]
#[must_use]
pub fn weighted(score: f32, weight: f32) -> f32 {
    weight * score
}

/// Vector-index distance to similarity: `1 - distance`.
///
/// Not clamped; a distance above 1 yields a negative similarity, which still
/// orders correctly inside one vector list.
#[inline]
#[must_use]
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 - distance
}

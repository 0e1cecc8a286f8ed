//! Rank fusion for hybrid retrieval.
//!
//! Layout: `kernels` (weighted term, distance→similarity), `linear` (weighted linear fuse).

mod kernels;
mod linear;

pub use kernels::{distance_to_similarity, weighted};
pub use linear::fuse;

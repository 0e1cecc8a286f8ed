//! Error types for retrieval operations.

use thiserror::Error;

/// Errors for hybrid retrieval.
///
/// Only [`RetrievalError::InvalidConfig`] ever reaches a `retrieve` caller;
/// the other variants are logged and absorbed where they occur.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    /// Retrieval parameters rejected at the boundary
    #[error("Invalid retrieval config: {0}")]
    InvalidConfig(String),

    /// A ranking signal (vector or keyword) could not produce candidates
    #[error("{signal} signal unavailable: {reason}")]
    SignalUnavailable {
        /// Signal name (`vector` or `keyword`)
        signal: &'static str,
        /// Underlying failure
        reason: String,
    },

    /// Query cache could not be used for this call
    #[error("Query cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Settings value could not be interpreted
    #[error("Settings error: {0}")]
    Settings(String),
}

impl RetrievalError {
    /// Build a `SignalUnavailable` error from any displayable failure.
    #[must_use]
    pub fn signal(signal: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::SignalUnavailable {
            signal,
            reason: reason.to_string(),
        }
    }
}

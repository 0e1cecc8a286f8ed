//! Retrieval types - Passage, ScoredPassage, RetrievalConfig.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// Default vector signal weight.
pub const DEFAULT_VECTOR_WEIGHT: f32 = 0.6;
/// Default keyword signal weight.
pub const DEFAULT_KEYWORD_WEIGHT: f32 = 0.4;
/// Default number of fused results.
pub const DEFAULT_TOP_K: usize = 5;

/// Metadata value attached to a passage (string or number only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Text value (source name, document type, ...)
    Text(String),
    /// Numeric value (chunk index, page, ...)
    Number(f64),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for MetadataValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

/// Immutable unit of retrievable content.
///
/// Identity for deduplication is the exact `content` text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Passage text
    pub content: String,
    /// Source metadata (document name, chunk index, type, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl Passage {
    /// Create a passage without metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Which signal produced a scored passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalOrigin {
    /// Dense embedding similarity
    Vector,
    /// Sparse term-frequency similarity
    Keyword,
    /// Present in both signal lists
    Both,
}

impl SignalOrigin {
    /// Stable lowercase name, used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Keyword => "keyword",
            Self::Both => "both",
        }
    }

    /// Origin after the same passage is seen from `other` as well.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        if self == other { self } else { Self::Both }
    }
}

/// A passage paired with a signal-specific or fused score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    /// Retrieved passage
    pub passage: Passage,
    /// Score (signal scale before fusion, fused score after)
    pub score: f32,
    /// Signal(s) that produced this passage
    pub origin: SignalOrigin,
}

impl ScoredPassage {
    /// Create a scored passage.
    #[must_use]
    pub fn new(passage: Passage, score: f32, origin: SignalOrigin) -> Self {
        Self {
            passage,
            score,
            origin,
        }
    }

    /// Passage content (deduplication key).
    #[must_use]
    pub fn content(&self) -> &str {
        &self.passage.content
    }
}

/// Parameters for one retrieval call.
///
/// Weights need not sum to 1. Distinct configs cache separately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Weight of the vector signal
    pub vector_weight: f32,
    /// Weight of the keyword signal
    pub keyword_weight: f32,
    /// Number of fused results to return
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl RetrievalConfig {
    /// Create a config.
    #[must_use]
    pub fn new(vector_weight: f32, keyword_weight: f32, top_k: usize) -> Self {
        Self {
            vector_weight,
            keyword_weight,
            top_k,
        }
    }

    /// Reject negative or non-finite weights and a zero `top_k`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        validate_weight("vector_weight", self.vector_weight)?;
        validate_weight("keyword_weight", self.keyword_weight)?;
        if self.top_k == 0 {
            return Err(RetrievalError::InvalidConfig(
                "top_k must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn validate_weight(name: &str, value: f32) -> Result<(), RetrievalError> {
    if !value.is_finite() {
        return Err(RetrievalError::InvalidConfig(format!(
            "{name} must be finite, got {value}"
        )));
    }
    if value < 0.0 {
        return Err(RetrievalError::InvalidConfig(format!(
            "{name} must be non-negative, got {value}"
        )));
    }
    Ok(())
}

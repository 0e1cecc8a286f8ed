//! omni-retrieval - Hybrid vector + keyword retrieval with a bounded query cache.
//!
//! # Architecture
//!
//! ```text
//! omni-retrieval/src/
//! ├── lib.rs         # Re-exports
//! ├── error.rs       # RetrievalError
//! ├── types.rs       # Passage, ScoredPassage, RetrievalConfig
//! ├── settings.rs    # YAML + env settings loader
//! ├── lexical/       # TF-IDF keyword index (atomic rebuild)
//! ├── fusion/        # Weighted linear rank fusion
//! ├── cache/         # QueryCache (SHA-256 keys, TTL + LRU)
//! ├── vector.rs      # VectorIndex / CorpusProvider seams
//! ├── retriever.rs   # HybridRetriever façade
//! └── stream.rs      # Streaming retrieval events
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use omni_retrieval::{HybridRetriever, RetrievalConfig, load_retrieval_settings};
//!
//! let retriever = HybridRetriever::new(vector_index, load_retrieval_settings()?);
//! retriever.rebuild_lexical_index(passages);
//! let hits = retriever.retrieve("退款", RetrievalConfig::new(0.6, 0.4, 2)).await?;
//! ```

pub mod cache;
pub mod error;
pub mod fusion;
pub mod lexical;
pub mod settings;
pub mod types;
pub mod vector;

mod retriever;
mod stream;

pub use cache::{CacheKey, CacheStats, QueryCache};
pub use error::RetrievalError;
pub use fusion::fuse;
pub use lexical::{LexicalIndex, LexicalSnapshot};
pub use retriever::HybridRetriever;
pub use settings::{
    CacheSettings, RetrievalSettings, RetrievalSettingsFile, load_retrieval_settings,
    load_retrieval_settings_from_paths,
};
pub use stream::RetrievalEvent;
pub use types::{MetadataValue, Passage, RetrievalConfig, ScoredPassage, SignalOrigin};
pub use vector::{CorpusProvider, VectorIndex};

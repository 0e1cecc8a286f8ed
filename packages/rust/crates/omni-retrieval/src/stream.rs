//! Streaming retrieval: typed progress events over a bounded channel.
//!
//! Every stream ends with exactly one terminal event (`Completed` or `Failed`).
//! Dropping the receiver cancels the producer before the cache store step, so
//! an abandoned call never commits a cache entry.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::RetrievalError;
use crate::retriever::{HybridRetriever, fuse_signals};
use crate::types::{RetrievalConfig, ScoredPassage, SignalOrigin};

const STREAM_BUFFER: usize = 8;

/// Progress event of one streamed retrieval.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalEvent {
    /// Results come from the query cache
    CacheHit,
    /// One signal finished fetching
    SignalCompleted {
        /// `Vector` or `Keyword`
        signal: SignalOrigin,
        /// Candidates it contributed
        candidates: usize,
    },
    /// Final ranked results
    Results(Vec<ScoredPassage>),
    /// Terminal: the call finished
    Completed,
    /// Terminal: the call was rejected
    Failed(RetrievalError),
}

impl RetrievalEvent {
    /// True for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

impl HybridRetriever {
    /// Run a retrieval on a background task, reporting progress as events.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn retrieve_stream(
        self: &Arc<Self>,
        query: impl Into<String>,
        config: RetrievalConfig,
    ) -> mpsc::Receiver<RetrievalEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let retriever = Arc::clone(self);
        let query = query.into();
        tokio::spawn(async move {
            if retriever.drive_stream(&query, config, &tx).await.is_none() {
                tracing::debug!(
                    event = "retrieval.stream.cancelled",
                    "stream receiver dropped; retrieval abandoned"
                );
            }
        });
        rx
    }

    /// Returns `None` once the receiver is gone.
    async fn drive_stream(
        &self,
        query: &str,
        config: RetrievalConfig,
        tx: &mpsc::Sender<RetrievalEvent>,
    ) -> Option<()> {
        if let Err(error) = config.validate() {
            return tx.send(RetrievalEvent::Failed(error)).await.ok();
        }

        if let Some(cached) = self.cache().get(query, &config) {
            tx.send(RetrievalEvent::CacheHit).await.ok()?;
            tx.send(RetrievalEvent::Results(cached.to_vec())).await.ok()?;
            return tx.send(RetrievalEvent::Completed).await.ok();
        }

        let (vector, keyword) = self.fetch_signals(query, &config).await;
        tx.send(RetrievalEvent::SignalCompleted {
            signal: SignalOrigin::Vector,
            candidates: vector.len(),
        })
        .await
        .ok()?;
        tx.send(RetrievalEvent::SignalCompleted {
            signal: SignalOrigin::Keyword,
            candidates: keyword.len(),
        })
        .await
        .ok()?;

        let fused = fuse_signals(vector, keyword, &config);
        if tx.is_closed() {
            return None;
        }
        self.cache().set(query, &config, fused.clone());

        tx.send(RetrievalEvent::Results(fused)).await.ok()?;
        tx.send(RetrievalEvent::Completed).await.ok()
    }
}

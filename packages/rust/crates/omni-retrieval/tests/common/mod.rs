#![allow(dead_code)]

use std::sync::Arc;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use omni_retrieval::{CorpusProvider, Passage, VectorIndex};
use tokio::sync::Notify;

pub const REFUND: &str = "退款流程：订单签收后7天内可在个人中心申请退款，审核通过后原路返还。";
pub const DELIVERY: &str = "配送时间：一般订单在下单后48小时内发货，3至5天送达。";
pub const COMPANY: &str = "公司简介：我们是一家专注于智能客服系统的科技公司。";

/// The three-passage customer-service corpus.
pub fn service_corpus() -> Vec<Passage> {
    vec![
        Passage::new(REFUND)
            .with_metadata("source", "faq.md")
            .with_metadata("chunk", 0_i64),
        Passage::new(DELIVERY)
            .with_metadata("source", "faq.md")
            .with_metadata("chunk", 1_i64),
        Passage::new(COMPANY)
            .with_metadata("source", "about.md")
            .with_metadata("chunk", 0_i64),
    ]
}

/// Vector index returning fixed `(passage, distance)` hits for every query.
#[derive(Default)]
pub struct StaticVectorIndex {
    hits: Vec<(Passage, f32)>,
    calls: AtomicUsize,
    requested_k: Mutex<Vec<usize>>,
}

impl StaticVectorIndex {
    pub fn new(hits: Vec<(Passage, f32)>) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    /// Refund nearest, then delivery, then company.
    pub fn service() -> Self {
        let corpus = service_corpus();
        Self::new(
            corpus
                .into_iter()
                .zip([0.2_f32, 0.5, 0.7])
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested_k(&self) -> Vec<usize> {
        self.requested_k.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl VectorIndex for StaticVectorIndex {
    async fn similarity_search(&self, _query: &str, k: usize) -> Result<Vec<(Passage, f32)>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested_k.lock().unwrap_or_else(PoisonError::into_inner).push(k);
        Ok(self.hits.iter().take(k).cloned().collect())
    }
}

/// Vector index that always fails.
#[derive(Default)]
pub struct FailingVectorIndex {
    calls: AtomicUsize,
}

impl FailingVectorIndex {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for FailingVectorIndex {
    async fn similarity_search(&self, _query: &str, _k: usize) -> Result<Vec<(Passage, f32)>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        bail!("embedding service unreachable")
    }
}

/// Vector index that parks every call until released.
pub struct GatedVectorIndex {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
    inner: StaticVectorIndex,
}

impl GatedVectorIndex {
    pub fn service() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
            inner: StaticVectorIndex::service(),
        }
    }
}

#[async_trait]
impl VectorIndex for GatedVectorIndex {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<(Passage, f32)>> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.similarity_search(query, k).await
    }
}

/// Corpus provider over a fixed passage list, or a failing one.
pub struct StaticCorpus(pub Option<Vec<Passage>>);

#[async_trait]
impl CorpusProvider for StaticCorpus {
    async fn passages(&self) -> Result<Vec<Passage>> {
        match &self.0 {
            Some(passages) => Ok(passages.clone()),
            None => bail!("knowledge base offline"),
        }
    }
}

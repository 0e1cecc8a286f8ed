//! HybridRetriever tests: fused ranking, caching, degradation and admin operations.

#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{FailingVectorIndex, StaticCorpus, StaticVectorIndex};
use omni_retrieval::{
    CacheSettings, HybridRetriever, Passage, RetrievalConfig, RetrievalError, RetrievalSettings,
    SignalOrigin,
};

fn settings() -> RetrievalSettings {
    RetrievalSettings {
        cache: CacheSettings {
            enabled: true,
            ttl_secs: 0,
            max_entries: 100,
        },
        ..RetrievalSettings::default()
    }
}

fn service_retriever(vector: Arc<StaticVectorIndex>) -> HybridRetriever {
    let retriever = HybridRetriever::new(vector, settings());
    retriever.rebuild_lexical_index(common::service_corpus());
    retriever
}

fn refund_config() -> RetrievalConfig {
    RetrievalConfig::new(0.6, 0.4, 2)
}

#[tokio::test]
async fn test_refund_query_ranks_refund_passage_first() {
    let vector = Arc::new(StaticVectorIndex::service());
    let retriever = service_retriever(Arc::clone(&vector));

    let results = retriever.retrieve("退款", refund_config()).await.expect("retrieve");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].content(), common::REFUND);
    assert_eq!(results[0].origin, SignalOrigin::Both);
    assert!(results[0].score > 0.6 * 0.8);
    assert_eq!(results[1].content(), common::DELIVERY);
    assert!((results[1].score - 0.6 * 0.5).abs() < 1e-6);
    assert_eq!(
        results[0].passage.metadata.get("source").map(ToString::to_string),
        Some("faq.md".to_string())
    );
}

#[tokio::test]
async fn test_repeated_query_is_served_from_cache() {
    let vector = Arc::new(StaticVectorIndex::service());
    let retriever = service_retriever(Arc::clone(&vector));

    let first = retriever.retrieve("退款", refund_config()).await.expect("first");
    let second = retriever.retrieve("退款", refund_config()).await.expect("second");

    assert_eq!(first, second);
    assert_eq!(vector.calls(), 1);
    let stats = retriever.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.total_entries, 1);
}

#[tokio::test]
async fn test_each_signal_is_asked_for_twice_top_k() {
    let vector = Arc::new(StaticVectorIndex::service());
    let retriever = service_retriever(Arc::clone(&vector));

    retriever
        .retrieve("退款", RetrievalConfig::new(0.6, 0.4, 3))
        .await
        .expect("retrieve");

    assert_eq!(vector.requested_k(), vec![6]);
}

#[tokio::test]
async fn test_invalid_configs_are_rejected_before_any_work() {
    let vector = Arc::new(StaticVectorIndex::service());
    let retriever = service_retriever(Arc::clone(&vector));

    for config in [
        RetrievalConfig::new(-0.1, 0.4, 2),
        RetrievalConfig::new(0.6, f32::NAN, 2),
        RetrievalConfig::new(f32::INFINITY, 0.4, 2),
        RetrievalConfig::new(0.6, 0.4, 0),
    ] {
        let error = retriever
            .retrieve("退款", config)
            .await
            .expect_err("invalid config");
        assert!(matches!(error, RetrievalError::InvalidConfig(_)), "{error}");
    }

    assert_eq!(vector.calls(), 0);
    assert_eq!(retriever.cache_stats().total_queries, 0);
}

#[tokio::test]
async fn test_zero_weights_are_valid() {
    let vector = Arc::new(StaticVectorIndex::service());
    let retriever = service_retriever(vector);

    let results = retriever
        .retrieve("退款", RetrievalConfig::new(0.0, 0.0, 5))
        .await
        .expect("retrieve");

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.score == 0.0));
    assert_eq!(results[0].content(), common::REFUND);
}

#[tokio::test]
async fn test_vector_failure_degrades_to_keyword_only() {
    let vector = Arc::new(FailingVectorIndex::default());
    let retriever = HybridRetriever::new(Arc::clone(&vector) as _, settings());
    retriever.rebuild_lexical_index(common::service_corpus());

    let results = retriever.retrieve("退款", refund_config()).await.expect("degraded");

    assert_eq!(vector.calls(), 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content(), common::REFUND);
    assert_eq!(results[0].origin, SignalOrigin::Keyword);
}

#[tokio::test]
async fn test_both_signals_empty_returns_empty_success() {
    let retriever = HybridRetriever::new(Arc::new(FailingVectorIndex::default()), settings());

    let results = retriever.retrieve("退款", refund_config()).await.expect("empty");

    assert!(results.is_empty());
}

#[tokio::test]
async fn test_unbuilt_lexical_index_uses_vector_only() {
    let retriever = HybridRetriever::new(Arc::new(StaticVectorIndex::service()), settings());

    let results = retriever.retrieve("退款", refund_config()).await.expect("retrieve");

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.origin == SignalOrigin::Vector));
    assert!((results[0].score - 0.48).abs() < 1e-6);
}

#[tokio::test]
async fn test_disabled_cache_fetches_every_time() {
    let vector = Arc::new(StaticVectorIndex::service());
    let mut settings = settings();
    settings.cache.enabled = false;
    let retriever = HybridRetriever::new(Arc::clone(&vector) as _, settings);

    retriever.retrieve("退款", refund_config()).await.expect("first");
    retriever.retrieve("退款", refund_config()).await.expect("second");

    assert_eq!(vector.calls(), 2);
    let stats = retriever.cache_stats();
    assert!(!stats.enabled);
    assert_eq!(stats.total_queries, 0);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let vector = Arc::new(StaticVectorIndex::service());
    let retriever = service_retriever(Arc::clone(&vector));

    retriever.retrieve("退款", refund_config()).await.expect("first");
    retriever
        .retrieve("退款", RetrievalConfig::new(0.5, 0.5, 2))
        .await
        .expect("other config");
    assert_eq!(retriever.invalidate("退款"), 2);

    retriever.retrieve("退款", refund_config()).await.expect("refetch");
    assert_eq!(vector.calls(), 3);
}

#[tokio::test]
async fn test_clear_cache_resets_stats() {
    let vector = Arc::new(StaticVectorIndex::service());
    let retriever = service_retriever(Arc::clone(&vector));
    retriever.retrieve("退款", refund_config()).await.expect("first");
    retriever.retrieve("退款", refund_config()).await.expect("second");

    retriever.clear_cache();

    let stats = retriever.cache_stats();
    assert_eq!(stats.total_entries, 0);
    assert_eq!(stats.total_queries, 0);
    retriever.retrieve("退款", refund_config()).await.expect("third");
    assert_eq!(vector.calls(), 2);
}

#[tokio::test]
async fn test_rebuild_changes_keyword_results_for_new_queries() {
    let retriever = HybridRetriever::new(Arc::new(FailingVectorIndex::default()), settings());
    retriever.rebuild_lexical_index(common::service_corpus());
    assert!(
        retriever
            .retrieve("保修", refund_config())
            .await
            .expect("before")
            .is_empty()
    );

    retriever.rebuild_lexical_index(vec![Passage::new("保修政策：商品享有一年保修。")]);
    retriever.clear_cache();

    let results = retriever.retrieve("保修", refund_config()).await.expect("after");
    assert_eq!(results.len(), 1);
    assert_eq!(retriever.lexical().len(), 1);
}

#[tokio::test]
async fn test_rebuild_does_not_clear_cache() {
    let vector = Arc::new(StaticVectorIndex::service());
    let retriever = service_retriever(Arc::clone(&vector));
    let before = retriever.retrieve("退款", refund_config()).await.expect("before");

    retriever.rebuild_lexical_index(vec![Passage::new("unrelated")]);
    let after = retriever.retrieve("退款", refund_config()).await.expect("after");

    assert_eq!(before, after);
    assert_eq!(vector.calls(), 1);
}

#[tokio::test]
async fn test_refresh_from_provider() {
    let retriever = HybridRetriever::new(Arc::new(FailingVectorIndex::default()), settings());

    let count = retriever
        .refresh_from(&StaticCorpus(Some(common::service_corpus())))
        .await
        .expect("refresh");
    assert_eq!(count, 3);
    assert_eq!(retriever.lexical().len(), 3);

    let error = retriever
        .refresh_from(&StaticCorpus(None))
        .await
        .expect_err("provider offline");
    assert!(format!("{error:#}").contains("knowledge base offline"));
    assert_eq!(retriever.lexical().len(), 3);
}

#[tokio::test]
async fn test_adjust_weights_changes_default_config() {
    let vector = Arc::new(StaticVectorIndex::service());
    let retriever = service_retriever(vector);
    assert_eq!(retriever.default_config(), RetrievalConfig::default());

    retriever.adjust_weights(0.0, 1.0).expect("valid weights");
    let config = retriever.default_config();
    assert_eq!(config.vector_weight, 0.0);
    assert_eq!(config.keyword_weight, 1.0);
    assert_eq!(config.top_k, 5);

    let results = retriever.retrieve_default("退款").await.expect("retrieve");
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].content(), common::REFUND);
    assert!(results[0].score > 0.0);
    assert_eq!(results[1].score, 0.0);

    let error = retriever.adjust_weights(-1.0, 0.5).expect_err("negative");
    assert!(matches!(error, RetrievalError::InvalidConfig(_)));
    assert_eq!(retriever.default_config(), config);
}

#[tokio::test]
async fn test_closed_retriever_keeps_serving_uncached() {
    let vector = Arc::new(StaticVectorIndex::service());
    let retriever = service_retriever(Arc::clone(&vector));
    retriever.retrieve("退款", refund_config()).await.expect("cached");

    retriever.close();

    retriever.retrieve("退款", refund_config()).await.expect("after close");
    retriever.retrieve("退款", refund_config()).await.expect("after close");
    assert_eq!(vector.calls(), 3);
    assert!(!retriever.cache_stats().enabled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retrievals_agree() {
    let retriever = Arc::new(service_retriever(Arc::new(StaticVectorIndex::service())));
    let expected = retriever.retrieve("退款", refund_config()).await.expect("baseline");
    retriever.clear_cache();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let retriever = Arc::clone(&retriever);
            tokio::spawn(async move { retriever.retrieve("退款", refund_config()).await })
        })
        .collect();

    for handle in handles {
        let results = handle.await.expect("join").expect("retrieve");
        assert_eq!(results, expected);
    }
    let stats = retriever.cache_stats();
    assert_eq!(stats.total_queries, 16);
    assert_eq!(stats.total_entries, 1);
}

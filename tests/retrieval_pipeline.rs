use std::collections::HashSet;
use std::sync::Arc;

use docqa::embedding::{Embedder, HashingClient};
use docqa::rate_limit::{ManualClock, RateLimiter};
use docqa::retrieval::{
    ChunkingPolicy, EmbeddingSchedule, PageText, RetrievalError, RetrievalService, chunk_text,
};

fn service_with_limiter(rate_limiter: RateLimiter) -> RetrievalService {
    let client = HashingClient::new(384).expect("hashing client");
    RetrievalService::new(
        Arc::new(Embedder::from_client(Arc::new(client))),
        rate_limiter,
        ChunkingPolicy::default(),
        EmbeddingSchedule::default(),
    )
}

fn service() -> RetrievalService {
    service_with_limiter(RateLimiter::new(10_000, 1_000))
}

fn sentences(prefix: &str, count: usize) -> String {
    (0..count)
        .map(|i| format!("{prefix} sentence {i} records item {} in ledger {}.", i * 7, i % 5))
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::test]
async fn uniform_document_is_chunked_and_searchable() {
    let service = service();
    let outcome = service
        .upload(vec![PageText::new(1, "A".repeat(1000))])
        .await
        .expect("upload");
    assert_eq!(outcome.chunk_count, 3);

    let state = service.current_state().expect("indexed");
    let lengths: Vec<usize> = state.chunks().iter().map(|c| c.text.len()).collect();
    assert_eq!(lengths, vec![500, 500, 100]);
    assert_eq!(state.index().len(), 3);

    let target = state.chunks()[1].text.clone();
    let outcome = service.query(&target, 1, "client").await.expect("query");
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].text, target);
    assert_eq!(outcome.results[0].distance, 0.0);
}

#[tokio::test]
async fn exact_chunk_text_returns_its_own_index() {
    let service = service();
    let text = sentences("Certificate", 40);
    service
        .upload(vec![PageText::new(4, text.clone())])
        .await
        .expect("upload");

    let expected = chunk_text(&text, Some(4), &ChunkingPolicy::default());
    assert!(expected.len() > 2);
    for (position, chunk) in expected.iter().enumerate() {
        let outcome = service.query(&chunk.text, 2, "client").await.expect("query");
        let top = &outcome.results[0];
        assert_eq!(top.chunk_index, position);
        assert_eq!(top.page, Some(4));
        assert_eq!(top.distance, 0.0);
        assert!(outcome.results[1].distance >= top.distance);
    }
}

#[tokio::test]
async fn top_k_is_bounded_by_chunk_count() {
    let service = service();
    service
        .upload(vec![PageText::new(1, sentences("Short", 3))])
        .await
        .expect("upload");

    let all = service.query("ledger", 50, "client").await.expect("query");
    assert_eq!(all.results.len(), 1);

    let none = service.query("ledger", 0, "client").await.expect("query");
    assert!(none.results.is_empty());
}

#[tokio::test]
async fn results_are_sorted_by_distance() {
    let service = service();
    service
        .upload(vec![
            PageText::new(1, sentences("Alpha", 20)),
            PageText::new(2, sentences("Beta", 20)),
        ])
        .await
        .expect("upload");

    let outcome = service
        .query("Beta sentence 3 records item 21", 10, "client")
        .await
        .expect("query");
    assert!(
        outcome
            .results
            .windows(2)
            .all(|pair| pair[0].distance <= pair[1].distance)
    );
    let indices: HashSet<usize> = outcome.results.iter().map(|r| r.chunk_index).collect();
    assert_eq!(indices.len(), outcome.results.len());
}

#[tokio::test]
async fn rate_limit_applies_through_service() {
    let clock = Arc::new(ManualClock::new(1_200));
    let service = service_with_limiter(RateLimiter::with_clock(2, 100, clock.clone()));
    service
        .upload(vec![PageText::new(1, sentences("Quota", 10))])
        .await
        .expect("upload");

    assert!(service.query("quota", 1, "10.0.0.1").await.is_ok());
    assert!(service.query("quota", 1, "10.0.0.1").await.is_ok());
    let rejected = service.query("quota", 1, "10.0.0.1").await.unwrap_err();
    assert!(matches!(
        rejected,
        RetrievalError::RateLimited { client_id } if client_id == "10.0.0.1"
    ));
    assert!(service.query("quota", 1, "10.0.0.2").await.is_ok());

    clock.advance(60);
    assert!(service.query("quota", 1, "10.0.0.1").await.is_ok());

    let metrics = service.metrics_snapshot();
    assert_eq!(metrics.queries_served, 4);
    assert_eq!(metrics.queries_rate_limited, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_never_mix_documents() {
    let service = Arc::new(service());
    let policy = ChunkingPolicy::default();
    let first = sentences("Northern", 60);
    let second = sentences("Southern", 25);
    let first_chunks: HashSet<String> = chunk_text(&first, Some(1), &policy)
        .into_iter()
        .map(|c| c.text)
        .collect();
    let second_chunks: HashSet<String> = chunk_text(&second, Some(1), &policy)
        .into_iter()
        .map(|c| c.text)
        .collect();

    service
        .upload(vec![PageText::new(1, first.clone())])
        .await
        .expect("initial upload");

    let mut handles = Vec::new();
    for round in 0..8 {
        let service = service.clone();
        let text = if round % 2 == 0 { second.clone() } else { first.clone() };
        handles.push(tokio::spawn(async move {
            service.upload(vec![PageText::new(1, text)]).await.map(|_| ())
        }));
    }

    let mut queries = Vec::new();
    for client in 0..16 {
        let service = service.clone();
        queries.push(tokio::spawn(async move {
            let id = format!("client-{client}");
            service.query("sentence records item", 5, &id).await
        }));
    }

    for handle in handles {
        handle.await.expect("join").expect("upload");
    }
    for handle in queries {
        let outcome = handle.await.expect("join").expect("query");
        let texts: HashSet<String> = outcome.texts().into_iter().collect();
        assert!(
            texts.is_subset(&first_chunks) || texts.is_subset(&second_chunks),
            "results mixed chunks from two documents"
        );
    }

    let state = service.current_state().expect("indexed");
    assert_eq!(state.chunks().len(), state.index().len());
}

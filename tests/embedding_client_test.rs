mod common;

use common::InMemoryCache;
use docrag::backing::embedding::HttpEmbeddingService;
use docrag::backing::EmbeddingService;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn caches_embeddings_so_repeat_text_does_not_reach_the_server() {
    let server = MockServer::start().await;
    let hit_count = Arc::new(AtomicUsize::new(0));
    let counter = hit_count.clone();

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(move |req: &wiremock::Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let inputs = body["input"].as_array().unwrap();
            let data: Vec<serde_json::Value> = inputs
                .iter()
                .enumerate()
                .map(|(i, _)| serde_json::json!({"embedding": [0.1, 0.2, 0.3], "index": i}))
                .collect();
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": data}))
        })
        .mount(&server)
        .await;

    let cache = Arc::new(InMemoryCache::default());
    let service = HttpEmbeddingService::new(cache, server.uri(), "test-model".to_string(), 3);

    let first = service.embed(&["hello world".to_string()]).await.unwrap();
    assert_eq!(first, vec![vec![0.1, 0.2, 0.3]]);
    assert_eq!(hit_count.load(Ordering::SeqCst), 1);

    let second = service.embed(&["hello world".to_string()]).await.unwrap();
    assert_eq!(second, vec![vec![0.1, 0.2, 0.3]]);
    assert_eq!(hit_count.load(Ordering::SeqCst), 1, "second call should be served entirely from cache");
}

#[tokio::test]
async fn mixed_batch_only_requests_the_uncached_texts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(|req: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let inputs = body["input"].as_array().unwrap();
            let data: Vec<serde_json::Value> = inputs
                .iter()
                .enumerate()
                .map(|(i, text)| serde_json::json!({"embedding": [text.as_str().unwrap().len() as f32, 0.0, 0.0], "index": i}))
                .collect();
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": data}))
        })
        .mount(&server)
        .await;

    let cache = Arc::new(InMemoryCache::default());
    let service = HttpEmbeddingService::new(cache, server.uri(), "test-model".to_string(), 3);

    service.embed(&["aa".to_string()]).await.unwrap();
    let both = service.embed(&["aa".to_string(), "bbb".to_string()]).await.unwrap();

    assert_eq!(both[0], vec![2.0, 0.0, 0.0]);
    assert_eq!(both[1], vec![3.0, 0.0, 0.0]);
}

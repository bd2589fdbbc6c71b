//! HTTP provider tests against a local mock server.

use httpmock::prelude::*;
use serde_json::json;

use chaptersmith::ChapterConfig;
use chaptersmith::EmbeddingProvider;
use chaptersmith::embeddings::HttpEmbeddingProvider;
use chaptersmith::generation::{
    ChatMessage, GenerationProvider, GenerationRequest, HttpGenerationProvider,
};
use chaptersmith::types::RagError;

fn server_config(server: &MockServer) -> ChapterConfig {
    ChapterConfig {
        api_key: Some("test-key".to_string()),
        api_base_url: server.base_url(),
        embedding_dimensions: 3,
        ..ChapterConfig::default()
    }
}

fn answer_request() -> GenerationRequest {
    GenerationRequest {
        messages: vec![
            ChatMessage::system("scope"),
            ChatMessage::user("what is an outlier?"),
        ],
        temperature: 0.7,
        max_tokens: 2000,
    }
}

#[tokio::test]
async fn embedding_provider_returns_the_service_vector() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/embeddings")
                .header("authorization", "Bearer test-key")
                .json_body_partial(r#"{"model": "embedding-3"}"#);
            then.status(200)
                .json_body(json!({"data": [{"embedding": [0.25, -0.5, 1.0]}]}));
        })
        .await;

    let provider = HttpEmbeddingProvider::from_config(&server_config(&server)).unwrap();
    let vector = provider.embed("outlier definition").await.unwrap();
    assert_eq!(vector, vec![0.25, -0.5, 1.0]);
    assert_eq!(provider.dimensions(), 3);
    mock.assert_async().await;
}

#[tokio::test]
async fn embedding_service_failure_carries_the_cause() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(429).body("rate limited");
        })
        .await;

    let provider = HttpEmbeddingProvider::from_config(&server_config(&server)).unwrap();
    let err = provider.embed("text").await.unwrap_err();
    match err {
        RagError::Embedding(cause) => assert!(cause.contains("rate limited")),
        other => panic!("expected embedding error, got {other:?}"),
    }
}

#[tokio::test]
async fn embedding_response_without_data_is_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(200).json_body(json!({"data": []}));
        })
        .await;

    let provider = HttpEmbeddingProvider::from_config(&server_config(&server)).unwrap();
    assert!(matches!(
        provider.embed("text").await,
        Err(RagError::Embedding(_))
    ));
}

#[tokio::test]
async fn generation_provider_returns_the_completion_text() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer test-key")
                .json_body_partial(r#"{"model": "glm-4.6v", "temperature": 0.7}"#);
            then.status(200).json_body(json!({
                "choices": [{"message": {"role": "assistant", "content": "An outlier is..."}}]
            }));
        })
        .await;

    let provider = HttpGenerationProvider::from_config(&server_config(&server)).unwrap();
    let answer = provider.complete(&answer_request()).await.unwrap();
    assert_eq!(answer, "An outlier is...");
    mock.assert_async().await;
}

#[tokio::test]
async fn generation_service_failure_carries_the_cause() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("upstream exploded");
        })
        .await;

    let provider = HttpGenerationProvider::from_config(&server_config(&server)).unwrap();
    let err = provider.complete(&answer_request()).await.unwrap_err();
    match err {
        RagError::Generation(cause) => assert!(cause.contains("upstream exploded")),
        other => panic!("expected generation error, got {other:?}"),
    }
}

#[tokio::test]
async fn generation_response_without_choices_is_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({"choices": []}));
        })
        .await;

    let provider = HttpGenerationProvider::from_config(&server_config(&server)).unwrap();
    assert!(matches!(
        provider.complete(&answer_request()).await,
        Err(RagError::Generation(_))
    ));
}

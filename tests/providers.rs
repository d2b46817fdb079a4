//! Embedding and generation providers against a local mock HTTP server:
//! request shape, response parsing and the single-retry policy.

use mockito::Matcher;

use askdocs::config::{EmbeddingConfig, GenerationConfig};
use askdocs::embedding::{Embedder, OllamaEmbedder, OpenAiEmbedder};
use askdocs::error::ServiceError;
use askdocs::generation::{AnthropicGenerator, ChatCompletionsGenerator, Generator, Prompt};

const KEY_ENV: &str = "ASKDOCS_TEST_PROVIDER_KEY";

fn set_key() {
    std::env::set_var(KEY_ENV, "test-key");
}

fn embedding_config(url: String) -> EmbeddingConfig {
    EmbeddingConfig {
        provider: "openai".to_string(),
        model: Some("text-embedding-3-small".to_string()),
        dims: Some(3),
        url: Some(url),
        api_key_env: Some(KEY_ENV.to_string()),
        timeout_secs: 5,
        ..EmbeddingConfig::default()
    }
}

fn generation_config(provider: &str, url: String) -> GenerationConfig {
    GenerationConfig {
        provider: provider.to_string(),
        model: Some("test-model".to_string()),
        url: Some(url),
        api_key_env: Some(KEY_ENV.to_string()),
        timeout_secs: 5,
        ..GenerationConfig::default()
    }
}

fn prompt() -> Prompt {
    Prompt {
        system: "system text".to_string(),
        user: "user text".to_string(),
    }
}

#[tokio::test]
async fn openai_embeddings_are_returned_in_input_order() {
    set_key();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/embeddings")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "text-embedding-3-small",
            "input": ["first", "second"]
        })))
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "data": [
                    { "index": 1, "embedding": [0.0, 1.0, 0.0] },
                    { "index": 0, "embedding": [1.0, 0.0, 0.0] }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let embedder = OpenAiEmbedder::openai(&embedding_config(server.url())).unwrap();
    let vectors = embedder
        .embed(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
    mock.assert_async().await;
}

#[tokio::test]
async fn transient_failure_is_retried_once() {
    set_key();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/embeddings")
        .with_status(503)
        .with_body("overloaded")
        .expect(2)
        .create_async()
        .await;

    let embedder = OpenAiEmbedder::openai(&embedding_config(server.url())).unwrap();
    let err = embedder.embed(&["x".to_string()]).await.unwrap_err();
    assert!(matches!(err, ServiceError::Status { status: 503, .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn client_error_is_not_retried() {
    set_key();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/embeddings")
        .with_status(400)
        .with_body("bad input")
        .expect(1)
        .create_async()
        .await;

    let embedder = OpenAiEmbedder::openai(&embedding_config(server.url())).unwrap();
    let err = embedder.embed(&["x".to_string()]).await.unwrap_err();
    match err {
        ServiceError::Status { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad input");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn no_retry_when_max_retries_is_zero() {
    set_key();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/embeddings")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let mut config = embedding_config(server.url());
    config.max_retries = 0;
    let embedder = OpenAiEmbedder::openai(&config).unwrap();
    assert!(embedder.embed(&["x".to_string()]).await.is_err());
    mock.assert_async().await;
}

#[tokio::test]
async fn ollama_embeddings() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/embed")
        .match_body(Matcher::PartialJson(serde_json::json!({ "model": "nomic" })))
        .with_header("content-type", "application/json")
        .with_body(r#"{"embeddings": [[0.5, 0.5]]}"#)
        .create_async()
        .await;

    let embedder = OllamaEmbedder::new(&EmbeddingConfig {
        provider: "ollama".to_string(),
        model: Some("nomic".to_string()),
        dims: Some(2),
        url: Some(server.url()),
        ..EmbeddingConfig::default()
    })
    .unwrap();
    let vectors = embedder.embed(&["hello".to_string()]).await.unwrap();
    assert_eq!(vectors, vec![vec![0.5, 0.5]]);
}

#[tokio::test]
async fn chat_completions_generation() {
    set_key();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "test-model",
            "messages": [
                { "role": "system", "content": "system text" },
                { "role": "user", "content": "user text" }
            ]
        })))
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "  The answer.  "}}]}"#)
        .create_async()
        .await;

    let generator =
        ChatCompletionsGenerator::openai(&generation_config("openai", server.url())).unwrap();
    assert_eq!(generator.model_name(), "test-model");
    assert_eq!(generator.generate(&prompt()).await.unwrap(), "The answer.");
    mock.assert_async().await;
}

#[tokio::test]
async fn anthropic_generation() {
    set_key();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "test-key")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "system": "system text",
            "messages": [{ "role": "user", "content": "user text" }]
        })))
        .with_header("content-type", "application/json")
        .with_body(r#"{"content": [{"type": "text", "text": "Grounded answer."}]}"#)
        .create_async()
        .await;

    let generator = AnthropicGenerator::new(&generation_config("anthropic", server.url())).unwrap();
    assert_eq!(generator.generate(&prompt()).await.unwrap(), "Grounded answer.");
    mock.assert_async().await;
}

#[tokio::test]
async fn malformed_generation_response_is_invalid() {
    set_key();
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices": []}"#)
        .create_async()
        .await;

    let generator =
        ChatCompletionsGenerator::mistral(&generation_config("mistral", server.url())).unwrap();
    let err = generator.generate(&prompt()).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidResponse(_)));
}

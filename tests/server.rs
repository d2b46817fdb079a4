//! HTTP API tests: a real router bound to an ephemeral port, driven with
//! reqwest.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use askdocs::app::App;
use askdocs::config::Config;
use askdocs::embedding::HashedEmbedder;
use askdocs::error::{PipelineError, ServiceError, NOT_FOUND_ANSWER};
use askdocs::generation::{Generator, Prompt};
use askdocs::models::{SourceDocument, SourceListing};
use askdocs::server::router;
use askdocs::store::MemoryIndex;
use askdocs::traits::{DocumentSource, SourceRegistry};

struct NotesSource;

#[async_trait]
impl DocumentSource for NotesSource {
    fn name(&self) -> &str {
        "notes"
    }

    async fn list_documents(&self) -> Result<SourceListing, PipelineError> {
        Ok(SourceListing {
            documents: vec![SourceDocument {
                name: "harbour.txt".to_string(),
                source: self.source_label(),
                content_type: "text/plain".to_string(),
                bytes: b"The harbour opens at dawn. Ships dock at pier seven.".to_vec(),
            }],
            failures: Vec::new(),
        })
    }
}

/// Blocks its listing until released, keeping a sync running.
struct GatedSource {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl DocumentSource for GatedSource {
    fn name(&self) -> &str {
        "gated"
    }

    async fn list_documents(&self) -> Result<SourceListing, PipelineError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(SourceListing::default())
    }
}

struct FixedGenerator;

#[async_trait]
impl Generator for FixedGenerator {
    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn generate(&self, _prompt: &Prompt) -> Result<String, ServiceError> {
        Ok("Ships dock at pier seven.".to_string())
    }
}

fn app(sources: Vec<Box<dyn DocumentSource>>) -> Arc<App> {
    let mut config = Config::default();
    config.index.backend = "memory".to_string();
    config.retrieval.min_relevance = -1.0;
    let mut registry = SourceRegistry::new();
    for s in sources {
        registry.register(s);
    }
    Arc::new(
        App::from_parts(
            config,
            Arc::new(MemoryIndex::new()),
            Arc::new(HashedEmbedder::new(128)),
            Arc::new(FixedGenerator),
            registry,
        )
        .unwrap(),
    )
}

async fn serve(app: Arc<App>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(app)).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn post(base: &str, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}{}", base, path))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn health_reports_ok() {
    let base = serve(app(Vec::new())).await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn ask_without_context_is_ok_and_ungrounded() {
    let base = serve(app(Vec::new())).await;
    let (status, body) = post(&base, "/ask", json!({ "question": "When does the harbour open?" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["text"], NOT_FOUND_ANSWER);
    assert_eq!(body["grounded"], false);
    assert_eq!(body["sources"], json!([]));
}

#[tokio::test]
async fn sync_then_ask_returns_grounded_answer() {
    let base = serve(app(vec![Box::new(NotesSource)])).await;

    let (status, body) = post(&base, "/sync", json!({ "source": "custom:notes" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["summaries"][0]["loaded"], 1);

    let (status, body) = post(&base, "/ask", json!({ "question": "Where do ships dock?" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["grounded"], true);
    assert_eq!(body["sources"], json!(["harbour.txt"]));
    assert_eq!(body["text"], "Ships dock at pier seven.");

    let (status, body) = post(&base, "/search", json!({ "question": "harbour", "limit": 1 })).await;
    assert_eq!(status, 200);
    assert_eq!(body["results"][0]["document"], "harbour.txt");
}

#[tokio::test]
async fn unknown_source_is_404_with_error_body() {
    let base = serve(app(vec![Box::new(NotesSource)])).await;
    let (status, body) = post(&base, "/sync", json!({ "source": "github:nowhere" })).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "unknown_source");
    assert!(!body["error"]["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn empty_question_is_400() {
    let base = serve(app(Vec::new())).await;
    let (status, body) = post(&base, "/search", json!({ "question": "   " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "Please ask a question.");
}

#[tokio::test]
async fn concurrent_sync_is_409() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let app = app(vec![Box::new(GatedSource {
        started: started.clone(),
        release: release.clone(),
    })]);
    let base = serve(app.clone()).await;

    let first = {
        let base = base.clone();
        tokio::spawn(async move { post(&base, "/sync", json!({})).await })
    };
    started.notified().await;
    assert!(app.sync_running());

    let (status, body) = post(&base, "/sync", json!({ "source": "custom:gated" })).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "sync_in_progress");

    let (status, body) = post(&base, "/sync/cancel", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["cancelled"], true);

    release.notify_one();
    let (status, _) = first.await.unwrap();
    assert_eq!(status, 200);
}

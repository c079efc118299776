//! Suggestion endpoint tests: in-process via `oneshot`, and over a real
//! socket against a mock Gemini upstream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, Uri};
use axum::{Json, Router};
use canvasx_suggest::{
    router, suggester_from_config, SuggestConfig, SuggestError, Suggester, SuggestionClient,
    SuggestionProvider,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

enum Behaviour {
    Reply(&'static str),
    Fail,
    Panic,
}

struct MockProvider {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl MockProvider {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SuggestionProvider for MockProvider {
    async fn generate(&self, _prompt: &str) -> Result<String, SuggestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Reply(text) => Ok(text.to_string()),
            Behaviour::Fail => Err(SuggestError::MalformedResponse("mock".to_string())),
            Behaviour::Panic => panic!("provider blew up"),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

fn app(provider: Arc<MockProvider>) -> Router {
    router(Arc::new(Suggester::new(provider)))
}

async fn post_json(app: Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ai-suggestions")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_returns_parsed_suggestions() {
    let provider = MockProvider::new(Behaviour::Reply("Big Summer Sale\n\n  Sun's out, deals out \nHot prices\nSizzling savings\nOne too many"));
    let (status, body) = post_json(app(provider.clone()), json!({ "text": "summer sale" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "suggestions": ["Big Summer Sale", "Sun's out, deals out", "Hot prices", "Sizzling savings"] })
    );
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_accepts_selected_text_field() {
    let provider = MockProvider::new(Behaviour::Reply("A\nB"));
    let (status, body) = post_json(app(provider), json!({ "selectedText": "hello" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "suggestions": ["A", "B"] }));
}

#[tokio::test]
async fn test_blank_text_short_circuits() {
    let provider = MockProvider::new(Behaviour::Reply("never"));

    for body in [json!({ "text": "" }), json!({ "text": "   " }), json!({})] {
        let (status, reply) = post_json(app(provider.clone()), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply, json!({ "suggestions": [] }));
    }
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

async fn post_raw(app: Router, content_type: Option<&str>, body: &'static str) -> (StatusCode, Value) {
    let mut request = Request::builder().method("POST").uri("/api/ai-suggestions");
    if let Some(content_type) = content_type {
        request = request.header("content-type", content_type);
    }
    let response = app
        .oneshot(request.body(Body::from(body)).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_missing_or_unreadable_body_is_empty_list() {
    let provider = MockProvider::new(Behaviour::Reply("never"));

    let cases = [
        (None, ""),
        (Some("application/json"), ""),
        (Some("text/plain"), "hello"),
        (Some("application/json"), "{ broken"),
        (Some("application/json"), r#"{"text":["not","a","string"]}"#),
    ];
    for (content_type, body) in cases {
        let (status, reply) = post_raw(app(provider.clone()), content_type, body).await;
        assert_eq!(status, StatusCode::OK, "body {body:?}");
        assert_eq!(reply, json!({ "suggestions": [] }));
    }
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_text_field_wins_when_both_are_sent() {
    let provider = MockProvider::new(Behaviour::Reply("A"));
    let (status, body) = post_json(
        app(provider.clone()),
        json!({ "text": "current", "selectedText": "older" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "suggestions": ["A"] }));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_body_without_json_content_type_is_still_read() {
    let provider = MockProvider::new(Behaviour::Reply("A\nB"));
    let (status, body) = post_raw(app(provider), None, r#"{"selectedText":"hello"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "suggestions": ["A", "B"] }));
}

#[tokio::test]
async fn test_provider_failure_is_empty_list() {
    let (status, body) = post_json(app(MockProvider::new(Behaviour::Fail)), json!({ "text": "hi" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "suggestions": [] }));
}

#[tokio::test]
async fn test_internal_fault_is_500() {
    let (status, body) = post_json(app(MockProvider::new(Behaviour::Panic)), json!({ "text": "hi" })).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Failed to generate suggestions" }));
}

#[tokio::test]
async fn test_disabled_suggester_is_empty_list() {
    let app = router(Arc::new(Suggester::disabled()));
    let (status, body) = post_json(app, json!({ "text": "hi" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "suggestions": [] }));
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_client_fetches_over_http() {
    let base = serve(app(MockProvider::new(Behaviour::Reply("One\nTwo")))).await;
    let client = SuggestionClient::with_timeout(&base, Duration::from_secs(5)).unwrap();

    assert_eq!(client.fetch("hello").await, vec!["One", "Two"]);
    assert!(client.fetch("Click to edit").await.is_empty());
}

#[tokio::test]
async fn test_client_server_error_is_empty() {
    let base = serve(app(MockProvider::new(Behaviour::Panic))).await;
    let client = SuggestionClient::with_timeout(&base, Duration::from_secs(5)).unwrap();

    assert!(client.fetch("hello").await.is_empty());
}

#[derive(Default)]
struct Captured {
    path: Option<String>,
    api_key: Option<String>,
    body: Option<Value>,
}

/// Serve a fake Gemini API that answers every POST with `reply`.
async fn mock_gemini(reply: Value, status: StatusCode) -> (String, Arc<Mutex<Captured>>) {
    let captured = Arc::new(Mutex::new(Captured::default()));
    let seen = captured.clone();
    let app = Router::new().fallback(move |uri: Uri, headers: HeaderMap, Json(body): Json<Value>| {
        let seen = seen.clone();
        let reply = reply.clone();
        async move {
            let mut seen = seen.lock().unwrap();
            seen.path = Some(uri.path().to_string());
            seen.api_key = headers
                .get("x-goog-api-key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            seen.body = Some(body);
            (status, Json(reply))
        }
    });
    (serve(app).await, captured)
}

#[tokio::test]
async fn test_gemini_end_to_end() {
    let (upstream, captured) = mock_gemini(
        json!({ "candidates": [{ "content": { "parts": [{ "text": "Shine bright\nGlow up\n" }] } }] }),
        StatusCode::OK,
    )
    .await;

    let suggester = suggester_from_config(Some(
        SuggestConfig::new("test-key").with_base_url(upstream),
    ))
    .unwrap();
    let (status, body) = post_json(router(Arc::new(suggester)), json!({ "text": "light" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "suggestions": ["Shine bright", "Glow up"] }));

    let captured = captured.lock().unwrap();
    assert_eq!(
        captured.path.as_deref(),
        Some("/v1beta/models/gemini-2.0-flash:generateContent")
    );
    assert_eq!(captured.api_key.as_deref(), Some("test-key"));
    let prompt = captured.body.as_ref().unwrap()["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(prompt.contains("\"light\""));
}

#[tokio::test]
async fn test_gemini_upstream_error_is_empty_list() {
    let (upstream, _captured) =
        mock_gemini(json!({ "error": { "code": 403 } }), StatusCode::FORBIDDEN).await;

    let suggester = suggester_from_config(Some(
        SuggestConfig::new("bad-key").with_base_url(upstream),
    ))
    .unwrap();
    let (status, body) = post_json(router(Arc::new(suggester)), json!({ "text": "light" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "suggestions": [] }));
}

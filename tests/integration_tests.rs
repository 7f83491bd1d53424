//! Integration tests for the coach service
//!
//! These drive the full stack (HTTP handlers, router, adapters, key rotation) against a fake
//! upstream that answers per host.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tradal_coach::chain::ChainConfig;
use tradal_coach::client::{BoxError, HttpClient};
use tradal_coach::coach::Coach;
use tradal_coach::prompt::SystemPrompt;
use tradal_coach::router::Router;
use tradal_coach::{AppState, build_router};

const CHAT_OK: &str = r#"{"choices":[{"message":{"role":"assistant","content":"Wait for the retest."}}]}"#;
const GEMINI_QUOTA: &str =
    r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;

#[derive(Debug, Clone)]
struct Seen {
    uri: String,
    headers: HashMap<String, String>,
    body: Value,
}

/// Answers each upstream host with a fixed response and records every call.
#[derive(Debug, Clone, Default)]
struct FakeUpstreams {
    routes: Arc<HashMap<String, (StatusCode, String)>>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl FakeUpstreams {
    fn new(routes: &[(&str, StatusCode, &str)]) -> Self {
        Self {
            routes: Arc::new(
                routes
                    .iter()
                    .map(|(host, status, body)| (host.to_string(), (*status, body.to_string())))
                    .collect(),
            ),
            seen: Arc::default(),
        }
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for FakeUpstreams {
    async fn request(
        &self,
        req: axum::extract::Request,
    ) -> Result<axum::response::Response, BoxError> {
        let uri = req.uri().to_string();
        let host = req.uri().host().unwrap_or_default().to_string();
        let headers = req
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let bytes = axum::body::to_bytes(req.into_body(), usize::MAX).await?;
        let body = serde_json::from_slice(&bytes)?;
        self.seen.lock().unwrap().push(Seen { uri, headers, body });

        let (status, body) = self
            .routes
            .get(&host)
            .cloned()
            .unwrap_or((StatusCode::BAD_GATEWAY, "no route".to_string()));
        Ok(axum::response::Response::builder()
            .status(status)
            .body(axum::body::Body::from(body))?)
    }
}

fn server(upstreams: FakeUpstreams, env: &[(&str, &str)]) -> TestServer {
    let env: HashMap<String, String> = env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let providers = ChainConfig::builtin()
        .unwrap()
        .build(upstreams, |var| env.get(var).cloned())
        .unwrap();
    let router = Router::new(providers, SystemPrompt::trading_coach());
    TestServer::new(build_router(AppState::new(Coach::new(router)))).unwrap()
}

#[tokio::test]
async fn test_gemini_quota_exhaustion_falls_through_to_groq() {
    let upstreams = FakeUpstreams::new(&[
        ("generativelanguage.googleapis.com", StatusCode::TOO_MANY_REQUESTS, GEMINI_QUOTA),
        ("api.groq.com", StatusCode::OK, CHAT_OK),
    ]);
    let server = server(
        upstreams.clone(),
        &[
            ("GEMINI_API_KEYS", "AIza-key-00001,AIza-key-00002"),
            ("GROQ_API_KEYS", "gsk_only_key_0001"),
        ],
    );

    let response = server
        .post("/v1/coach/chat")
        .json(&json!({"message": "Is EURUSD bullish?"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["reply"], "Wait for the retest.");

    let seen = upstreams.seen();
    // 7 Gemini models x 2 keys, then a single Groq call.
    assert_eq!(seen.len(), 15);
    assert!(seen[..14].iter().all(|s| s.uri.contains("generativelanguage")));
    assert!(seen[14].uri.starts_with("https://api.groq.com/openai/v1/chat/completions"));

    let keys: Vec<&str> = seen[..4]
        .iter()
        .map(|s| s.headers["x-goog-api-key"].as_str())
        .collect();
    assert_eq!(
        keys,
        vec!["AIza-key-00001", "AIza-key-00002", "AIza-key-00001", "AIza-key-00002"]
    );
    assert!(seen[0].uri.contains("gemini-2.5-flash:generateContent"));
    assert!(seen[2].uri.contains("gemini-2.0-flash-exp:generateContent"));
}

#[tokio::test]
async fn test_auth_failure_skips_provider_without_rotating() {
    let upstreams = FakeUpstreams::new(&[
        (
            "api.groq.com",
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Invalid API Key"}}"#,
        ),
        ("api.cerebras.ai", StatusCode::OK, CHAT_OK),
    ]);
    let server = server(
        upstreams.clone(),
        &[
            ("GROQ_API_KEYS", "gsk_bad_key_00001,gsk_bad_key_00002"),
            ("CEREBRAS_API_KEYS", "csk_key_000000001"),
        ],
    );

    let response = server
        .post("/v1/coach/chat")
        .json(&json!({
            "message": "Review my chart",
            "image": "data:image/jpeg;base64,/9j/4AAQSkZJRg=="
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let seen = upstreams.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].uri.contains("api.groq.com"));

    // Cerebras is text only: the image is dropped and the prompt annotated.
    let cerebras = &seen[1];
    assert_eq!(cerebras.body["model"], "llama3.1-70b");
    let user = cerebras.body["messages"][1]["content"].as_str().unwrap();
    assert!(user.starts_with("Review my chart\n\n[System Note: Image analysis failed"));
    assert!(cerebras.body.get("temperature").is_none());
}

#[tokio::test]
async fn test_every_upstream_failing_yields_503() {
    let upstreams = FakeUpstreams::new(&[
        ("openrouter.ai", StatusCode::INTERNAL_SERVER_ERROR, "oops"),
        ("api.deepseek.com", StatusCode::OK, r#"{"choices":[]}"#),
    ]);
    let server = server(
        upstreams.clone(),
        &[
            ("OPENROUTER_API_KEY", "sk-or-000000001"),
            ("DEEPSEEK_API_KEY", "sk-ds-000000001"),
        ],
    );

    let response = server
        .post("/v1/coach/review")
        .json(&json!({"trade": {"pair": "USDJPY", "pnl": 40}}))
        .await;

    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.json::<Value>()["error"]["message"],
        "AI service temporarily unavailable"
    );

    let seen = upstreams.seen();
    assert_eq!(seen.len(), 2);
    let first = &seen[0];
    assert_eq!(first.headers["x-title"], "The Tradal");
    assert_eq!(first.headers["http-referer"], "https://thetradal.com");
    let prompt = first.body["messages"][1]["content"].as_str().unwrap();
    assert!(prompt.starts_with("Review this trade data and give 3 bullet points of advice: {"));
}

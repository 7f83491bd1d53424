//! Tradal Coach - a failover router for AI text generation
//!
//! A chat or trade-review request is answered by the first provider in a fixed priority chain
//! that succeeds. Each provider rotates through its own API keys and candidate models on rate
//! limits before the router falls through to the next provider.

use axum::Router;
use axum::routing::{get, post};
use axum_prometheus::{
    EndpointLabel, GenericMetricLayer, Handle, PrometheusMetricLayerBuilder,
    metrics_exporter_prometheus::PrometheusHandle,
};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{info, instrument};

pub mod chain;
pub mod client;
pub mod coach;
pub mod credentials;
pub mod errors;
pub mod handlers;
pub mod prompt;
pub mod provider;
pub mod request;
pub mod rotation;
pub mod router;

use coach::Coach;

/// Shared state of the HTTP service
#[derive(Clone, Debug)]
pub struct AppState {
    pub coach: Arc<Coach>,
}

impl AppState {
    pub fn new(coach: Coach) -> Self {
        Self {
            coach: Arc::new(coach),
        }
    }
}

/// Build the main router
/// This creates routes for:
/// - `/v1/coach/chat` - Chat with the trading coach
/// - `/v1/coach/review` - Review a single trade
/// - `/v1/providers` - The provider chain in priority order
#[instrument(skip(state))]
pub fn build_router(state: AppState) -> Router {
    info!("Building router");
    Router::new()
        .route("/v1/coach/chat", post(handlers::chat))
        .route("/v1/coach/review", post(handlers::review))
        .route("/v1/providers", get(handlers::providers))
        .with_state(state)
}

/// Counter of provider attempts made by the router, labelled by `provider` and `outcome`.
pub const PROVIDER_OUTCOMES: &str = "coach_provider_outcomes_total";

/// Serve the prometheus exposition at `/metrics`.
#[instrument(skip(handle))]
pub fn build_metrics_router(handle: PrometheusHandle) -> Router {
    info!("Building metrics router");
    Router::new().route("/metrics", get(move || async move { handle.render() }))
}

type MetricsLayerAndHandle = (
    GenericMetricLayer<'static, PrometheusHandle, Handle>,
    PrometheusHandle,
);

/// Requests outside the coach routes are counted under this endpoint label.
fn unmatched_endpoint(_: &str) -> String {
    "unmatched".to_string()
}

/// Install the prometheus recorder and build the HTTP metrics layer.
///
/// Endpoints are labelled by route so stray paths cannot grow the label set. The same
/// recorder also receives [`PROVIDER_OUTCOMES`].
pub fn build_metrics_layer_and_handle(
    prefix: impl Into<Cow<'static, str>>,
) -> MetricsLayerAndHandle {
    info!("Building metrics layer");
    PrometheusMetricLayerBuilder::new()
        .with_prefix(prefix)
        .with_endpoint_label_type(EndpointLabel::MatchedPathWithFallbackFn(unmatched_endpoint))
        .with_default_metrics()
        .build_pair()
}

#[cfg(test)]
pub mod test_utils {
    use crate::client::{BoxError, HttpClient};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Records every request and replays scripted responses. The last response repeats once
    /// the script runs out.
    #[derive(Debug, Clone)]
    pub struct MockHttpClient {
        pub requests: Arc<Mutex<Vec<MockRequest>>>,
        responses: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
    }

    #[derive(Debug, Clone)]
    pub struct MockRequest {
        pub method: String,
        pub uri: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl MockRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        }
    }

    impl MockHttpClient {
        pub fn new(status: StatusCode, body: &str) -> Self {
            Self::with_sequence(vec![(status, body.to_string())])
        }

        pub fn with_sequence(responses: Vec<(StatusCode, String)>) -> Self {
            Self {
                requests: Arc::new(Mutex::new(Vec::new())),
                responses: Arc::new(Mutex::new(responses.into())),
            }
        }

        pub fn get_requests(&self) -> Vec<MockRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn next_response(&self) -> (StatusCode, String) {
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses
                    .front()
                    .cloned()
                    .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, String::new()))
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn request(
            &self,
            req: axum::extract::Request,
        ) -> Result<axum::response::Response, BoxError> {
            let method = req.method().to_string();
            let uri = req.uri().to_string();
            let headers = req
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();

            let body = axum::body::to_bytes(req.into_body(), usize::MAX)
                .await?
                .to_vec();

            self.requests.lock().unwrap().push(MockRequest {
                method,
                uri,
                headers,
                body,
            });

            let (status, body) = self.next_response();
            Ok(axum::response::Response::builder()
                .status(status)
                .body(axum::body::Body::from(body))?)
        }
    }
}

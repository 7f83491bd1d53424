//! HTTP client abstraction for calling upstream AI providers
//!
//! Provider adapters never talk to hyper directly: they go through [`HttpClient`], so tests can
//! swap in a recording mock and production uses a pooled hyper client.
use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, header};
use axum::response::IntoResponse;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use std::time::Duration;
use tracing::trace;
use url::Url;

/// Upper bound on upstream response bodies we are willing to buffer.
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

pub type HyperClient = Client<
    hyper_tls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    axum::body::Body,
>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait HttpClient: std::fmt::Debug + Send + Sync {
    async fn request(&self, req: axum::extract::Request) -> Result<axum::response::Response, BoxError>;
}

#[async_trait]
impl HttpClient for HyperClient {
    async fn request(&self, req: axum::extract::Request) -> Result<axum::response::Response, BoxError> {
        self.request(req)
            .await
            .map(|res| res.into_response())
            .map_err(|e| Box::new(e) as BoxError)
    }
}

/// Connection pool settings for the production client.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub idle_timeout: Duration,
    pub max_idle_per_host: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(90),
            max_idle_per_host: 100,
        }
    }
}

pub fn create_hyper_client(pool: PoolConfig) -> HyperClient {
    let https = hyper_tls::HttpsConnector::new();

    tracing::debug!(
        "HTTP client pool config: idle_timeout={:?}, max_idle_per_host={}",
        pool.idle_timeout,
        pool.max_idle_per_host
    );

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(pool.idle_timeout)
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .pool_timer(hyper_util::rt::TokioTimer::new())
        .build(https)
}

/// Status and fully buffered body of an upstream response.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// POST a JSON body to `url` with the given extra headers and buffer the response.
///
/// Sets the `host` header from the URL; some upstreams sit behind proxies that reject requests
/// without it.
pub async fn post_json<T: HttpClient + ?Sized>(
    client: &T,
    url: &Url,
    headers: &HeaderMap,
    body: &(impl serde::Serialize + Sync),
) -> Result<UpstreamResponse, BoxError> {
    let bytes = serde_json::to_vec(body)?;
    trace!("POST {} ({} bytes)", url, bytes.len());

    let mut req = Request::builder()
        .method(Method::POST)
        .uri(url.as_str())
        .body(Body::from(bytes))?;

    let req_headers = req.headers_mut();
    req_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    req_headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(host) = url.host_str() {
        let host_value = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        req_headers.insert(header::HOST, host_value.parse::<HeaderValue>()?);
    }
    for (name, value) in headers {
        req_headers.insert(name.clone(), value.clone());
    }

    let response = client.request(req).await?;
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), MAX_RESPONSE_BYTES).await?;
    Ok(UpstreamResponse { status, body })
}

/// Build a header map from string pairs, rejecting invalid names or values.
pub fn header_map<'a>(
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<HeaderMap, BoxError> {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.insert(
            name.parse::<HeaderName>()?,
            value.parse::<HeaderValue>()?,
        );
    }
    Ok(map)
}

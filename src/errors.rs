//! Error taxonomy for generation requests
//!
//! Every failure inside the router is one of these variants. Only
//! `AllProvidersExhausted`, `Timeout` and `InvalidRequest` ever reach the caller of
//! [`crate::router::Router`]; everything else is recovered by falling through the chain.
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The adapter has no usable credentials. Raised before any network I/O.
    #[error("{provider}: no credentials configured")]
    NotConfigured { provider: String },

    /// Quota or rate-limit signal for the current key. Never escapes an adapter.
    #[error("{provider}: rate limited: {message}")]
    RateLimited { provider: String, message: String },

    /// Any non-recoverable failure of a single attempt.
    #[error("{provider}: upstream error{}: {message}", fmt_status(.status))]
    Upstream {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// Every key/model combination of one adapter was rate limited.
    #[error("{provider}: all credentials and models exhausted after {attempts} attempts ({last})")]
    AllCredentialsExhausted {
        provider: String,
        attempts: usize,
        last: Box<GenerationError>,
    },

    /// Terminal: every adapter in the chain failed.
    #[error("all {attempted} AI providers failed; last error: {last_error}")]
    AllProvidersExhausted { attempted: usize, last_error: String },

    /// The caller's deadline passed before any adapter succeeded.
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// The caller supplied an unusable request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl GenerationError {
    pub fn upstream(provider: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.to_owned(),
            status,
            message: message.into(),
        }
    }

    pub fn rate_limited(provider: &str, message: impl Into<String>) -> Self {
        Self::RateLimited {
            provider: provider.to_owned(),
            message: message.into(),
        }
    }

    /// Short label for the provider outcome metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConfigured { .. } => "not_configured",
            Self::RateLimited { .. } => "rate_limited",
            Self::Upstream { .. } => "upstream_error",
            Self::AllCredentialsExhausted { .. } => "credentials_exhausted",
            Self::AllProvidersExhausted { .. } => "providers_exhausted",
            Self::Timeout(_) => "timeout",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Whether this error should move the rotation on to the next key or model.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

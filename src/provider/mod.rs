//! Provider adapters
//!
//! A provider wraps one upstream generation backend behind [`Provider::generate`]. Two wire
//! families are implemented: OpenAI-compatible chat completions (most vendors) and Google's
//! Gemini `generateContent`. Both use [`crate::rotation::rotate`] for key and model fallback.

mod gemini;
mod openai;
mod spec;

pub use gemini::Gemini;
pub use openai::OpenAiCompatible;
pub use spec::{ProviderKind, ProviderSpec, VisionPolicy};

use crate::client::HttpClient;
use crate::credentials::CredentialSet;
use crate::errors::GenerationError;
use crate::request::{GenerationRequest, ImageInput};
use async_trait::async_trait;
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Longest upstream error body we copy into an error message.
const MAX_ERROR_CHARS: usize = 300;

/// One upstream generation backend.
#[async_trait]
pub trait Provider: std::fmt::Debug + Send + Sync {
    /// Display name used in logs and the providers listing.
    fn name(&self) -> &str;

    /// Number of credentials loaded for this provider.
    fn credentials(&self) -> usize;

    /// Whether an attached image actually reaches the model.
    fn supports_images(&self) -> bool;

    fn is_configured(&self) -> bool {
        self.credentials() > 0
    }

    /// Generate a completion. Fails with [`GenerationError::NotConfigured`] before any network
    /// call when no credentials are loaded.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// What a provider will actually send for a given request.
#[derive(Debug)]
pub(crate) struct Plan<'a> {
    pub(crate) models: &'a [String],
    pub(crate) prompt: Cow<'a, str>,
    pub(crate) image: Option<&'a ImageInput>,
}

impl VisionPolicy {
    /// Choose models, prompt and image for `request` according to this policy.
    pub(crate) fn plan<'a>(
        &'a self,
        text_models: &'a [String],
        request: &'a GenerationRequest,
    ) -> Plan<'a> {
        let Some(image) = request.image.as_ref() else {
            return Plan {
                models: text_models,
                prompt: Cow::Borrowed(&request.user_prompt),
                image: None,
            };
        };
        match self {
            VisionPolicy::Native => Plan {
                models: text_models,
                prompt: Cow::Borrowed(&request.user_prompt),
                image: Some(image),
            },
            VisionPolicy::Models { models } => Plan {
                models,
                prompt: Cow::Borrowed(&request.user_prompt),
                image: Some(image),
            },
            VisionPolicy::TextOnly { note } => Plan {
                models: text_models,
                prompt: request.prompt_with_note(note),
                image: None,
            },
        }
    }
}

/// Build the adapter described by `spec`, loading its credentials through `lookup`.
///
/// A provider without credentials is still built; it reports `NotConfigured` on every call.
pub fn build_provider<T>(
    spec: &ProviderSpec,
    client: T,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Arc<dyn Provider>>
where
    T: HttpClient + 'static,
{
    let (keys, source) = CredentialSet::resolve(&spec.credential_vars, lookup);
    match source {
        Some(var) => info!(
            provider = %spec.name,
            "Loaded {} key(s) from {}",
            keys.len(),
            var
        ),
        None => info!(
            provider = %spec.name,
            "No credentials found in {:?}, provider disabled",
            spec.credential_vars
        ),
    }

    let provider: Arc<dyn Provider> = match spec.kind {
        ProviderKind::OpenAiCompatible => Arc::new(OpenAiCompatible::new(spec.clone(), keys, client)?),
        ProviderKind::Gemini => Arc::new(Gemini::new(spec.clone(), keys, client)?),
    };
    Ok(provider)
}

/// Join `path` onto `base`, treating `base` as a directory even without a trailing slash.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path)
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        status: Option<String>,
    },
    Plain(String),
}

/// Best-effort extraction of a human readable message (and vendor status string) from an
/// upstream error body.
pub(crate) fn upstream_error(body: &[u8]) -> (String, Option<String>) {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorBody::Detailed { message, status },
        }) => (
            message.unwrap_or_else(|| truncate(&String::from_utf8_lossy(body))),
            status,
        ),
        Ok(ErrorEnvelope {
            error: ErrorBody::Plain(message),
        }) => (message, None),
        Err(_) => (truncate(&String::from_utf8_lossy(body)), None),
    }
}

fn truncate(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "empty response body".to_string();
    }
    match text.char_indices().nth(MAX_ERROR_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

//! Google Gemini `generateContent` adapter
use super::{Plan, Provider, ProviderSpec, endpoint, upstream_error};
use crate::client::{HttpClient, header_map, post_json};
use crate::credentials::{Credential, CredentialSet, KeyRotator};
use crate::errors::GenerationError;
use crate::request::GenerationRequest;
use crate::rotation::rotate;
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

const API_KEY_HEADER: &str = "x-goog-api-key";
const API_VERSION: &str = "v1beta";
const QUOTA_STATUS: &str = "RESOURCE_EXHAUSTED";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    Text(String),
    InlineData(InlineData<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug)]
pub struct Gemini<T> {
    spec: ProviderSpec,
    headers: HeaderMap,
    rotator: KeyRotator,
    client: T,
}

impl<T: HttpClient> Gemini<T> {
    pub fn new(spec: ProviderSpec, keys: CredentialSet, client: T) -> anyhow::Result<Self> {
        let headers = header_map(spec.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map_err(|e| anyhow::anyhow!("invalid headers for provider '{}': {}", spec.name, e))?;
        // Fail at startup rather than on the first request.
        for model in &spec.text_models {
            model_endpoint(&spec.base_url, model)?;
        }
        Ok(Self {
            spec,
            headers,
            rotator: KeyRotator::new(keys),
            client,
        })
    }

    fn generation_config(&self) -> Option<GenerationConfig> {
        if self.spec.temperature.is_none() && self.spec.max_tokens.is_none() {
            return None;
        }
        Some(GenerationConfig {
            temperature: self.spec.temperature,
            max_output_tokens: self.spec.max_tokens,
        })
    }

    async fn attempt(
        &self,
        key: Credential,
        model: String,
        system_prompt: &str,
        plan: &Plan<'_>,
    ) -> Result<String, GenerationError> {
        let name = self.spec.name.as_str();
        let url = model_endpoint(&self.spec.base_url, &model)
            .map_err(|e| GenerationError::upstream(name, None, e.to_string()))?;

        let mut parts = vec![Part::Text(format!(
            "{}\n\nUSER PROMPT:\n{}",
            system_prompt, plan.prompt
        ))];
        if let Some(image) = plan.image
            && let Some(data) = image.base64_payload()
        {
            parts.push(Part::InlineData(InlineData {
                mime_type: image.mime_type(),
                data,
            }));
        }
        let body = GenerateContentRequest {
            contents: [Content { role: "user", parts }],
            generation_config: self.generation_config(),
        };

        let mut headers = self.headers.clone();
        let key_value = HeaderValue::from_str(key.expose())
            .map_err(|_| GenerationError::upstream(name, None, "credential is not a valid header value"))?;
        headers.insert(HeaderName::from_static(API_KEY_HEADER), key_value);

        let response = post_json(&self.client, &url, &headers, &body)
            .await
            .map_err(|e| GenerationError::upstream(name, None, e.to_string()))?;

        read_content(name, response.status, &response.body)
    }
}

/// `{base}/v1beta/models/{model}:generateContent`, accepting model ids with or without the
/// `models/` prefix.
fn model_endpoint(base: &Url, model: &str) -> anyhow::Result<Url> {
    let model = model.strip_prefix("models/").unwrap_or(model);
    if model.is_empty() || model.contains('/') {
        anyhow::bail!("invalid Gemini model id '{model}'");
    }
    Ok(endpoint(
        base,
        &format!("{API_VERSION}/models/{model}:generateContent"),
    )?)
}

fn read_content(provider: &str, status: StatusCode, body: &[u8]) -> Result<String, GenerationError> {
    if !status.is_success() {
        let (message, vendor_status) = upstream_error(body);
        if status == StatusCode::TOO_MANY_REQUESTS || vendor_status.as_deref() == Some(QUOTA_STATUS) {
            return Err(GenerationError::rate_limited(provider, message));
        }
        return Err(GenerationError::upstream(provider, Some(status.as_u16()), message));
    }

    let parsed: GenerateContentResponse = serde_json::from_slice(body).map_err(|e| {
        GenerationError::upstream(provider, Some(status.as_u16()), format!("malformed response: {e}"))
    })?;

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::upstream(
            provider,
            Some(status.as_u16()),
            format!("prompt blocked: {reason}"),
        ));
    }

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenerationError::upstream(provider, Some(status.as_u16()), "empty completion"));
    }
    Ok(text)
}

#[async_trait]
impl<T: HttpClient> Provider for Gemini<T> {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn credentials(&self) -> usize {
        self.rotator.len()
    }

    fn supports_images(&self) -> bool {
        self.spec.vision.supports_images()
    }

    #[instrument(skip(self, request), fields(provider = %self.spec.name, vision = request.is_vision()))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if self.rotator.is_empty() {
            return Err(GenerationError::NotConfigured {
                provider: self.spec.name.clone(),
            });
        }

        let plan = self.spec.vision.plan(&self.spec.text_models, request);
        if plan.image.is_some_and(|image| !image.is_base64()) {
            // inlineData only carries base64.
            return Err(GenerationError::InvalidRequest(format!(
                "{}: image must be base64 encoded",
                self.spec.name
            )));
        }
        debug!("Planned {} model(s)", plan.models.len());

        rotate(&self.spec.name, &self.rotator, plan.models, |key, model| {
            self.attempt(key, model, &request.system_prompt, &plan)
        })
        .await
    }
}

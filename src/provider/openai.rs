//! OpenAI-compatible chat completions adapter
//!
//! Covers every vendor that exposes `POST /chat/completions` with bearer auth: OpenRouter,
//! GitHub Models, Together, NVIDIA NIM, SambaNova, Mistral, DeepSeek, Hugging Face, Groq and
//! Cerebras all differ only in base URL, models and vision policy.
use super::{Plan, Provider, ProviderSpec, endpoint, upstream_error};
use crate::client::{HttpClient, header_map, post_json};
use crate::credentials::{Credential, CredentialSet, KeyRotator};
use crate::errors::GenerationError;
use crate::request::{GenerationRequest, ImageInput};
use crate::rotation::rotate;
use anyhow::Context;
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

/// Request body for POST /chat/completions
#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

/// Message content - either a string or array of content parts
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ImageUrl {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug)]
pub struct OpenAiCompatible<T> {
    spec: ProviderSpec,
    endpoint: Url,
    headers: HeaderMap,
    rotator: KeyRotator,
    client: T,
}

impl<T: HttpClient> OpenAiCompatible<T> {
    pub fn new(spec: ProviderSpec, keys: CredentialSet, client: T) -> anyhow::Result<Self> {
        let endpoint = endpoint(&spec.base_url, "chat/completions")
            .with_context(|| format!("invalid base URL for provider '{}'", spec.name))?;
        let headers = header_map(spec.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map_err(|e| anyhow::anyhow!("invalid headers for provider '{}': {}", spec.name, e))?;
        Ok(Self {
            spec,
            endpoint,
            headers,
            rotator: KeyRotator::new(keys),
            client,
        })
    }

    fn messages(&self, system_prompt: &str, plan: &Plan<'_>) -> Vec<ChatMessage> {
        let user = match plan.image {
            None => MessageContent::Text(plan.prompt.clone().into_owned()),
            Some(image) => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: plan.prompt.clone().into_owned(),
                },
                ContentPart::ImageUrl {
                    image_url: self.image_url(image),
                },
            ]),
        };
        vec![
            ChatMessage {
                role: "system",
                content: MessageContent::Text(system_prompt.to_owned()),
            },
            ChatMessage {
                role: "user",
                content: user,
            },
        ]
    }

    fn image_url(&self, image: &ImageInput) -> ImageUrl {
        ImageUrl {
            url: image.data_url(),
            detail: self.spec.image_detail.clone(),
        }
    }

    async fn attempt(
        &self,
        key: Credential,
        model: String,
        messages: &[ChatMessage],
    ) -> Result<String, GenerationError> {
        let name = self.spec.name.as_str();
        let body = ChatCompletionRequest {
            model: &model,
            messages,
            temperature: self.spec.temperature,
            max_tokens: self.spec.max_tokens,
        };

        let mut headers = self.headers.clone();
        let auth = HeaderValue::from_str(&format!("Bearer {}", key.expose()))
            .map_err(|_| GenerationError::upstream(name, None, "credential is not a valid header value"))?;
        headers.insert(header::AUTHORIZATION, auth);

        let response = post_json(&self.client, &self.endpoint, &headers, &body)
            .await
            .map_err(|e| GenerationError::upstream(name, None, e.to_string()))?;

        read_completion(name, response.status, &response.body)
    }
}

/// Map an upstream response onto the error taxonomy.
fn read_completion(provider: &str, status: StatusCode, body: &[u8]) -> Result<String, GenerationError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let (message, _) = upstream_error(body);
        return Err(GenerationError::rate_limited(provider, message));
    }
    if !status.is_success() {
        let (message, _) = upstream_error(body);
        return Err(GenerationError::upstream(provider, Some(status.as_u16()), message));
    }

    let parsed: ChatCompletionResponse = serde_json::from_slice(body).map_err(|e| {
        GenerationError::upstream(provider, Some(status.as_u16()), format!("malformed response: {e}"))
    })?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| GenerationError::upstream(provider, Some(status.as_u16()), "empty completion"))
}

#[async_trait]
impl<T: HttpClient> Provider for OpenAiCompatible<T> {
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
        debug!(
            "Planned {} model(s), image attached: {}",
            plan.models.len(),
            plan.image.is_some()
        );
        let messages = self.messages(&request.system_prompt, &plan);

        rotate(&self.spec.name, &self.rotator, plan.models, |key, model| {
            self.attempt(key, model, &messages)
        })
        .await
    }
}

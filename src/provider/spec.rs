//! Declarative description of one provider in the chain
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Wire protocol spoken by the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `POST {base_url}/chat/completions` with bearer auth.
    #[default]
    OpenAiCompatible,
    /// `POST {base_url}/v1beta/models/{model}:generateContent` with `x-goog-api-key`.
    Gemini,
}

/// How a provider handles an attached image. Declared per provider, never inferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum VisionPolicy {
    /// The text models accept images; the image is attached as-is.
    Native,
    /// Use these vision-capable models instead of the text models when an image is present.
    Models { models: Vec<String> },
    /// Drop the image and append `note` to the prompt so the model knows it is working blind.
    TextOnly { note: String },
}

impl VisionPolicy {
    pub fn supports_images(&self) -> bool {
        !matches!(self, VisionPolicy::TextOnly { .. })
    }
}

/// A provider entry of the priority chain.
///
/// Credentials are never stored here: `credential_vars` names the configuration entries to
/// read them from, in order of preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct ProviderSpec {
    pub name: String,
    #[serde(default)]
    #[builder(default)]
    pub kind: ProviderKind,
    pub base_url: Url,
    pub credential_vars: Vec<String>,
    /// Candidate models for text requests, tried in order.
    pub text_models: Vec<String>,
    pub vision: VisionPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// `detail` hint for image parts (OpenAI-compatible only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_detail: Option<String>,
    /// Extra headers sent with every request (e.g. attribution headers for aggregators).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[builder(default)]
    pub headers: BTreeMap<String, String>,
}

impl ProviderSpec {
    /// Check the invariants the adapters rely on.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("provider name must not be empty");
        }
        if self.text_models.is_empty() {
            anyhow::bail!("provider '{}' has no text models", self.name);
        }
        if let VisionPolicy::Models { models } = &self.vision
            && models.is_empty()
        {
            anyhow::bail!("provider '{}' has an empty vision model list", self.name);
        }
        if self.credential_vars.is_empty() {
            anyhow::bail!("provider '{}' names no credential variables", self.name);
        }
        Ok(())
    }
}

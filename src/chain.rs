//! The provider priority chain
//!
//! A chain is an ordered list of [`ProviderSpec`]s. The built-in default mirrors the production
//! deployment; operators can replace it with a JSON file of the same shape.
use crate::client::HttpClient;
use crate::provider::{Provider, ProviderKind, ProviderSpec, VisionPolicy, build_provider};
use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const TEMPERATURE: f32 = 0.7;
const LONG_OUTPUT: u32 = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub providers: Vec<ProviderSpec>,
}

impl ChainConfig {
    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read providers file {}: {}", path.display(), e))?;

        let chain: ChainConfig = serde_json::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse providers file {}: {}", path.display(), e))?;
        chain.validate()?;

        info!(
            "Loaded {} providers from {}",
            chain.providers.len(),
            path.display()
        );
        Ok(chain)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("provider chain must contain at least one provider");
        }
        let mut seen = HashSet::new();
        for spec in &self.providers {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                anyhow::bail!("duplicate provider name '{}'", spec.name);
            }
        }
        Ok(())
    }

    /// Instantiate every adapter in chain order, reading credentials through `lookup`.
    pub fn build<T>(
        &self,
        client: T,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Vec<Arc<dyn Provider>>>
    where
        T: HttpClient + Clone + 'static,
    {
        self.validate()?;
        let providers: Vec<Arc<dyn Provider>> = self
            .providers
            .iter()
            .map(|spec| build_provider(spec, client.clone(), &lookup))
            .collect::<anyhow::Result<_>>()?;

        let configured = providers.iter().filter(|p| p.is_configured()).count();
        info!(
            "Provider chain ready: {} of {} providers configured",
            configured,
            providers.len()
        );
        Ok(providers)
    }
}

impl ChainConfig {
    /// The built-in production chain.
    pub fn builtin() -> anyhow::Result<Self> {
        Ok(Self {
            providers: default_chain()?,
        })
    }
}

fn text_only(vendor: &str) -> VisionPolicy {
    VisionPolicy::TextOnly {
        note: format!("[System Note: Image context unavailable on {vendor}. Analyze text data only.]"),
    }
}

fn vision_models(models: &[&str]) -> VisionPolicy {
    VisionPolicy::Models {
        models: strings(models),
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn base_url(raw: &str) -> anyhow::Result<url::Url> {
    url::Url::parse(raw).with_context(|| format!("invalid built-in base URL {raw}"))
}

/// The production priority chain, free-tier friendly providers first.
pub fn default_chain() -> anyhow::Result<Vec<ProviderSpec>> {
    Ok(vec![
        ProviderSpec::builder()
            .name("OpenRouter".into())
            .base_url(base_url("https://openrouter.ai/api/v1")?)
            .credential_vars(strings(&["OPENROUTER_API_KEY"]))
            .text_models(strings(&["google/gemini-2.0-flash-exp:free"]))
            .vision(VisionPolicy::Native)
            .temperature(TEMPERATURE)
            .headers(BTreeMap::from([
                ("HTTP-Referer".to_string(), "https://thetradal.com".to_string()),
                ("X-Title".to_string(), "The Tradal".to_string()),
            ]))
            .build(),
        ProviderSpec::builder()
            .name("GitHub Models".into())
            .base_url(base_url("https://models.inference.ai.azure.com")?)
            .credential_vars(strings(&["GITHUB_MODELS_TOKEN"]))
            .text_models(strings(&["gpt-4o"]))
            .vision(VisionPolicy::Native)
            .image_detail("high".into())
            .temperature(TEMPERATURE)
            .build(),
        ProviderSpec::builder()
            .name("Together AI".into())
            .base_url(base_url("https://api.together.xyz/v1")?)
            .credential_vars(strings(&["TOGETHER_API_KEY"]))
            .text_models(strings(&["meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo"]))
            .vision(vision_models(&["meta-llama/Llama-3.2-11B-Vision-Instruct-Turbo"]))
            .temperature(TEMPERATURE)
            .build(),
        ProviderSpec::builder()
            .name("NVIDIA NIM".into())
            .base_url(base_url("https://integrate.api.nvidia.com/v1")?)
            .credential_vars(strings(&["NVIDIA_API_KEY"]))
            .text_models(strings(&["meta/llama-3.1-405b-instruct"]))
            .vision(text_only("NVIDIA"))
            .temperature(TEMPERATURE)
            .max_tokens(LONG_OUTPUT)
            .build(),
        ProviderSpec::builder()
            .name("SambaNova".into())
            .base_url(base_url("https://api.sambanova.ai/v1")?)
            .credential_vars(strings(&["SAMBANOVA_API_KEY"]))
            .text_models(strings(&["Meta-Llama-3.1-405B-Instruct"]))
            .vision(text_only("SambaNova"))
            .temperature(TEMPERATURE)
            .build(),
        ProviderSpec::builder()
            .name("Mistral".into())
            .base_url(base_url("https://api.mistral.ai/v1")?)
            .credential_vars(strings(&["MISTRAL_API_KEY"]))
            .text_models(strings(&["mistral-large-latest"]))
            .vision(vision_models(&["pixtral-12b-2409"]))
            .temperature(TEMPERATURE)
            .build(),
        ProviderSpec::builder()
            .name("DeepSeek".into())
            .base_url(base_url("https://api.deepseek.com")?)
            .credential_vars(strings(&["DEEPSEEK_API_KEY"]))
            .text_models(strings(&["deepseek-chat"]))
            .vision(text_only("DeepSeek"))
            .temperature(TEMPERATURE)
            .build(),
        ProviderSpec::builder()
            .name("Hugging Face".into())
            .base_url(base_url("https://api-inference.huggingface.co/v1/")?)
            .credential_vars(strings(&["HUGGINGFACE_API_KEY"]))
            .text_models(strings(&["Qwen/Qwen2.5-72B-Instruct"]))
            .vision(text_only("Hugging Face"))
            .temperature(TEMPERATURE)
            .max_tokens(LONG_OUTPUT)
            .build(),
        ProviderSpec::builder()
            .name("Gemini".into())
            .kind(ProviderKind::Gemini)
            .base_url(base_url("https://generativelanguage.googleapis.com")?)
            .credential_vars(strings(&["GEMINI_API_KEYS", "GEMINI_API_KEY"]))
            .text_models(strings(&[
                "models/gemini-2.5-flash",
                "models/gemini-2.0-flash-exp",
                "models/gemini-1.5-flash",
                "models/gemini-1.5-flash-002",
                "models/gemini-1.5-pro",
                "models/gemini-1.5-flash-8b",
                "models/gemini-pro",
            ]))
            .vision(VisionPolicy::Native)
            .build(),
        ProviderSpec::builder()
            .name("Groq".into())
            .base_url(base_url("https://api.groq.com/openai/v1")?)
            .credential_vars(strings(&["GROQ_API_KEYS"]))
            .text_models(strings(&["llama-3.3-70b-versatile"]))
            .vision(vision_models(&["llama-3.2-90b-vision-preview"]))
            .temperature(TEMPERATURE)
            .max_tokens(LONG_OUTPUT)
            .build(),
        ProviderSpec::builder()
            .name("Cerebras".into())
            .base_url(base_url("https://api.cerebras.ai/v1")?)
            .credential_vars(strings(&["CEREBRAS_API_KEYS"]))
            .text_models(strings(&["llama3.1-70b"]))
            .vision(VisionPolicy::TextOnly {
                note: "[System Note: Image analysis failed on primary provider. This is a text-only fallback response.]"
                    .into(),
            })
            .build(),
    ])
}

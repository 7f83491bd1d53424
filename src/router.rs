//! First-success-wins routing over the provider chain
use crate::PROVIDER_OUTCOMES;
use crate::errors::GenerationError;
use crate::prompt::SystemPrompt;
use crate::provider::Provider;
use crate::request::{GenerationRequest, ImageInput};
use axum_prometheus::metrics::counter;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// Tries each provider of the chain once, in order, and returns the first completion.
#[derive(Debug, Clone)]
pub struct Router {
    chain: Arc<[Arc<dyn Provider>]>,
    prompt: SystemPrompt,
    timeout: Option<Duration>,
}

impl Router {
    pub fn new(chain: Vec<Arc<dyn Provider>>, prompt: SystemPrompt) -> Self {
        Self {
            chain: chain.into(),
            prompt,
            timeout: None,
        }
    }

    /// Abandon the chain once `timeout` has elapsed since the start of a call.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.chain
    }

    /// Generate a reply using the router's default timeout, if any.
    pub async fn generate(
        &self,
        message: &str,
        context: Option<&Value>,
        image: Option<ImageInput>,
    ) -> Result<String, GenerationError> {
        match self.timeout {
            Some(timeout) => {
                self.generate_until(message, context, image, Instant::now() + timeout)
                    .await
            }
            None => {
                let request = self.request(message, context, image)?;
                self.run_chain(&request).await
            }
        }
    }

    /// Generate a reply, giving up with [`GenerationError::Timeout`] at `deadline`.
    pub async fn generate_until(
        &self,
        message: &str,
        context: Option<&Value>,
        image: Option<ImageInput>,
        deadline: Instant,
    ) -> Result<String, GenerationError> {
        let request = self.request(message, context, image)?;
        let budget = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout_at(deadline, self.run_chain(&request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Deadline of {:?} passed, abandoning provider chain", budget);
                Err(GenerationError::Timeout(budget))
            }
        }
    }

    fn request(
        &self,
        message: &str,
        context: Option<&Value>,
        image: Option<ImageInput>,
    ) -> Result<GenerationRequest, GenerationError> {
        if message.trim().is_empty() {
            return Err(GenerationError::InvalidRequest(
                "message must not be empty".to_string(),
            ));
        }
        Ok(GenerationRequest::new(message, self.prompt.render(context)).with_image(image))
    }

    #[instrument(skip_all, fields(vision = request.is_vision()))]
    async fn run_chain(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut last_error = None;

        for provider in self.chain.iter() {
            info!(provider = provider.name(), "Trying provider");
            match provider.generate(request).await {
                Ok(text) => {
                    info!(provider = provider.name(), "Provider succeeded");
                    record_outcome(provider.name(), "success");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Provider failed");
                    record_outcome(provider.name(), e.kind());
                    last_error = Some(e);
                }
            }
        }

        Err(GenerationError::AllProvidersExhausted {
            attempted: self.chain.len(),
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no providers in chain".to_string()),
        })
    }
}

fn record_outcome(provider: &str, outcome: &'static str) {
    counter!(PROVIDER_OUTCOMES, "provider" => provider.to_owned(), "outcome" => outcome).increment(1);
}

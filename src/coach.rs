//! Trading coach facades over the [`Router`]
use crate::errors::GenerationError;
use crate::request::ImageInput;
use crate::router::Router;
use serde_json::Value;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct Coach {
    router: Router,
}

impl Coach {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Answer a chat message, optionally about a trade (`context`) and a chart screenshot.
    #[instrument(skip_all, fields(has_context = context.is_some(), has_image = image.is_some()))]
    pub async fn chat(
        &self,
        message: &str,
        context: Option<&Value>,
        image: Option<ImageInput>,
    ) -> Result<String, GenerationError> {
        self.router.generate(message, context, image).await
    }

    /// Three bullet points of advice on a single trade record.
    #[instrument(skip_all)]
    pub async fn review_trade(&self, trade: &Value) -> Result<String, GenerationError> {
        let prompt = format!(
            "Review this trade data and give 3 bullet points of advice: {}",
            trade
        );
        self.router.generate(&prompt, Some(trade), None).await
    }
}

//! System prompt template shared by every provider in the chain
use serde_json::Value;

/// Placeholder replaced by the rendered context.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Rendered in place of the context when the caller supplies none.
pub const NO_CONTEXT: &str = "No specific trade context.";

const TRADING_COACH: &str = r#"You are "Tradal Buddy", the lead trading analyst for The Tradal.

CONTEXT: {context}

PERSONA:
- Role: institutional trading analyst.
- Methodology: market structure, liquidity, price action, supply and demand.
- Tone: professional, analytical, precise.

INSTRUCTIONS:
1. Casual chat: answer briefly and professionally.
2. Text questions: explain concepts with precise terminology.
3. Chart analysis: when an image is provided, report pair and timeframe, market structure,
   nearest support and resistance, bullish and bearish probabilities with confluences, and a
   final bias (LONG / SHORT / WAIT) with invalidation level and targets.
4. Always close with: "Not financial advice.""#;

/// A fixed persona template with a single `{context}` slot.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    template: String,
}

impl SystemPrompt {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// The trading coach persona used by the chat and trade review facades.
    pub fn trading_coach() -> Self {
        Self::new(TRADING_COACH)
    }

    /// Interpolate the context, serialised as compact JSON, into the template.
    pub fn render(&self, context: Option<&Value>) -> String {
        let context = match context {
            Some(Value::Null) | None => NO_CONTEXT.to_string(),
            Some(value) => value.to_string(),
        };
        self.template.replace(CONTEXT_PLACEHOLDER, &context)
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::trading_coach()
    }
}

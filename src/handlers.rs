//! Axum handlers for the coach service
use crate::AppState;
use crate::errors::GenerationError;
use crate::request::ImageInput;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, instrument, warn};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub context: Option<Value>,
    /// Chart screenshot as a data URL or bare base64.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub trade: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub review: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub configured: bool,
    pub credentials: usize,
    pub vision: bool,
}

/// Response format for the providers listing, shaped like an OpenAI list object
#[derive(Debug, Serialize, Deserialize)]
pub struct ListProvidersResponse {
    pub object: String,
    pub data: Vec<ProviderInfo>,
}

/// Error returned by the coach endpoints, rendered as `{"error": {"message", "type"}}`.
#[derive(Debug)]
pub enum ApiError {
    Generation(GenerationError),
    Body(JsonRejection),
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        Self::Generation(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self::Body(err)
    }
}

fn error_response(status: StatusCode, error_type: &str, message: &str) -> Response {
    let body = json!({
        "error": {
            "message": message,
            "type": error_type,
        }
    });
    (status, Json(body)).into_response()
}

fn rejection_response(err: JsonRejection) -> Response {
    let message = match err {
        JsonRejection::JsonDataError(e) => {
            warn!(error = %e, "Invalid JSON data");
            format!("Invalid JSON: {}", e.body_text())
        }
        JsonRejection::JsonSyntaxError(e) => {
            warn!(error = %e, "JSON syntax error");
            format!("JSON syntax error: {}", e.body_text())
        }
        JsonRejection::MissingJsonContentType(e) => {
            warn!(error = %e, "Missing content type");
            return error_response(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "invalid_request_error",
                "Content-Type must be application/json",
            );
        }
        other => {
            warn!(error = %other, "Failed to read request body");
            "Failed to read request body".to_string()
        }
    };
    error_response(StatusCode::BAD_REQUEST, "invalid_request_error", &message)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Body(rejection) => return rejection_response(rejection),
            ApiError::Generation(err) => err,
        };
        match err {
            GenerationError::InvalidRequest(msg) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_request_error", &msg)
            }
            GenerationError::Timeout(_) => error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "timeout_error",
                "AI service timed out",
            ),
            other => {
                error!("Generation failed: {}", other);
                error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    "AI service temporarily unavailable",
                )
            }
        }
    }
}

#[instrument(skip_all)]
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = body?;
    // The chat UI sends an empty string when no chart is attached.
    let image = match request.image.as_deref() {
        Some(raw) => ImageInput::parse(raw)?,
        None => None,
    };

    let reply = state
        .coach
        .chat(&request.message, request.context.as_ref(), image)
        .await?;
    Ok(Json(ChatResponse { reply }))
}

#[instrument(skip_all)]
pub async fn review(
    State(state): State<AppState>,
    body: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let Json(request) = body?;
    let review = state.coach.review_trade(&request.trade).await?;
    Ok(Json(ReviewResponse { review }))
}

/// List the chain in priority order without exposing credentials.
#[instrument(skip(state))]
pub async fn providers(State(state): State<AppState>) -> impl IntoResponse {
    let data = state
        .coach
        .router()
        .providers()
        .iter()
        .map(|p| ProviderInfo {
            name: p.name().to_string(),
            configured: p.is_configured(),
            credentials: p.credentials(),
            vision: p.supports_images(),
        })
        .collect();

    Json(ListProvidersResponse {
        object: "list".to_string(),
        data,
    })
}

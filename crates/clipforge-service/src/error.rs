//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use clipforge_core::RenderError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Insufficient credits.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// A feature whose integration is not configured.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error. The message is safe to show to clients.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// The render provider did not finish processing a template in time.
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
            Self::UpstreamTimeout(msg) => (
                StatusCode::BAD_GATEWAY,
                "upstream_timeout",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<clipforge_store::StoreError> for ApiError {
    fn from(err: clipforge_store::StoreError) -> Self {
        Self::from(RenderError::from(err))
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            RenderError::Validation(msg) => Self::BadRequest(msg),
            RenderError::InvalidId(e) => Self::BadRequest(e.to_string()),
            RenderError::NoCompositions { template_id } => {
                Self::BadRequest(format!("template {template_id} exposes no compositions"))
            }
            RenderError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            RenderError::Timeout { template_id, .. } => Self::UpstreamTimeout(format!(
                "Template {template_id} is still being prepared, try again shortly"
            )),
            // Provider and storage details were logged where they happened.
            RenderError::Upload(msg) => {
                tracing::warn!(error = %msg, "Template upload error");
                Self::ExternalService("Template could not be prepared for rendering".into())
            }
            RenderError::ExternalService { service, message } => {
                tracing::warn!(service, error = %message, "External service error");
                Self::ExternalService(format!("The {service} is unavailable, try again later"))
            }
            RenderError::Reconciliation(msg) => {
                tracing::warn!(error = %msg, "Reconciliation error");
                Self::ExternalService("Render output could not be stored".into())
            }
            RenderError::Storage(msg) | RenderError::Configuration(msg) => Self::Internal(msg),
        }
    }
}

use crate::domain::{error::PipelineError, gateway::GatewayError};
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Newtype over the domain error so the HTTP mapping stays in the adapter layer.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

/// Well-formed JSON with the wrong shape is a validation error; anything
/// that is not JSON at all is a malformed payload.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        match rejection {
            JsonRejection::JsonDataError(_) => Self(PipelineError::Validation(message)),
            _ => Self(PipelineError::MalformedPayload(message)),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(PipelineError::Validation(rejection.body_text()))
    }
}

fn internal(context: &str, err: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!("{context}: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal error".to_string(),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            PipelineError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            PipelineError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{what} not found"),
            ),
            PipelineError::InvalidProduct(id) => (
                StatusCode::NOT_FOUND,
                "invalid_product",
                format!("course {id} not found"),
            ),
            err @ PipelineError::AlreadyPurchased { .. } => {
                (StatusCode::CONFLICT, "already_purchased", err.to_string())
            }
            err @ PipelineError::NotInitialized(_) => {
                (StatusCode::CONFLICT, "not_initialized", err.to_string())
            }
            PipelineError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone())
            }
            PipelineError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            PipelineError::Gateway(GatewayError::NotConfigured) => {
                tracing::error!("payment gateway credentials are not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "gateway_not_configured",
                    "payment gateway is not configured".to_string(),
                )
            }
            PipelineError::Gateway(GatewayError::Rejected { status, body }) => {
                tracing::warn!(gateway_status = status, "gateway rejected request");
                (StatusCode::BAD_GATEWAY, "gateway_rejected", body.clone())
            }
            PipelineError::Gateway(err) => {
                tracing::warn!("gateway error: {err}");
                (
                    StatusCode::BAD_GATEWAY,
                    "gateway_error",
                    "payment gateway unavailable".to_string(),
                )
            }
            PipelineError::WebhookSignature(_) => (
                StatusCode::BAD_REQUEST,
                "webhook_error",
                "invalid webhook signature".to_string(),
            ),
            PipelineError::MalformedPayload(msg) => {
                (StatusCode::BAD_REQUEST, "malformed_payload", msg.clone())
            }
            PipelineError::Database(err) => internal("database error", err),
            PipelineError::Serialization(err) => internal("serialization error", err),
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

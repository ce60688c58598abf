use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

const GENERIC_FAILURE_MESSAGE: &str = "เกิดข้อผิดพลาดในระบบ";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A request that was well-formed but broke a booking rule. `reason` is a
    /// stable machine-readable code, `message` is shown to the user.
    #[error("Business rule violated ({reason}): {message}")]
    BusinessRule { reason: String, message: String },

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl AppError {
    pub fn business(reason: &str, message: impl Into<String>) -> Self {
        AppError::BusinessRule {
            reason: reason.to_string(),
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::ValidationError(_)
            | AppError::BusinessRule { .. } => StatusCode::BAD_REQUEST,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            AppError::Internal(detail) | AppError::Database(detail) => {
                tracing::error!("Error: {}: {}", status, detail);
                json!({
                    "success": false,
                    "message": GENERIC_FAILURE_MESSAGE
                })
            }
            AppError::BusinessRule { reason, message } => {
                tracing::warn!("Rejected: {}: {} ({})", status, message, reason);
                json!({
                    "success": false,
                    "message": message,
                    "reason": reason
                })
            }
            AppError::Auth(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::ValidationError(msg) => {
                tracing::warn!("Error: {}: {}", status, msg);
                json!({
                    "success": false,
                    "message": msg
                })
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_error_taxonomy() {
        assert_eq!(AppError::ValidationError("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::business("slot_full", "full").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Auth("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Database("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_leak_details() {
        let response = AppError::Database("relation \"appointments\" does not exist".into())
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["message"], GENERIC_FAILURE_MESSAGE);
        assert!(!body.windows(8).any(|w| w == b"relation"));
    }

    #[tokio::test]
    async fn test_business_rule_carries_reason() {
        let response = AppError::business("slot_full", "ช่วงเวลานี้เต็มแล้ว").into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["reason"], "slot_full");
        assert_eq!(json["message"], "ช่วงเวลานี้เต็มแล้ว");
    }
}

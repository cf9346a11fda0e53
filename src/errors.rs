#[cfg(feature = "server")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
#[cfg(feature = "server")]
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictorError {
    #[error("Active subscription required")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("No domain suggestions could be generated")]
    NoSuggestions,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Webhook rejected: {0}")]
    Webhook(String),

    #[error("Network timeout")]
    Timeout,

    #[error("IO error: {0}")]
    IoError(#[from] tokio::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<tokio::time::error::Elapsed> for PredictorError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        PredictorError::Timeout
    }
}

impl From<sqlx::Error> for PredictorError {
    fn from(err: sqlx::Error) -> Self {
        PredictorError::Storage(err.to_string())
    }
}

impl PredictorError {
    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictorError::Unauthorized => "unauthorized",
            PredictorError::InvalidRequest(_) => "invalid_request",
            PredictorError::Upstream(_) => "upstream_error",
            PredictorError::NoSuggestions => "no_suggestions",
            PredictorError::Storage(_) => "storage_error",
            PredictorError::Webhook(_) => "webhook_error",
            PredictorError::Timeout => "timeout",
            PredictorError::IoError(_) => "io_error",
            PredictorError::HttpError(_) => "http_error",
            PredictorError::JsonError(_) => "json_error",
            PredictorError::ConfigError(_) => "config_error",
            PredictorError::Internal(_) => "internal",
        }
    }

    /// Message safe to show to an end user. Upstream causes stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            PredictorError::Unauthorized => {
                "You need an active subscription to use this feature.".to_string()
            }
            PredictorError::InvalidRequest(message) => message.clone(),
            PredictorError::NoSuggestions => {
                "No domain suggestions could be generated. Please try different criteria."
                    .to_string()
            }
            PredictorError::Webhook(reason) => reason.clone(),
            PredictorError::Upstream(_)
            | PredictorError::Timeout
            | PredictorError::HttpError(_)
            | PredictorError::JsonError(_) => {
                "The suggestion service is unavailable right now. Please try again.".to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

#[cfg(feature = "server")]
impl IntoResponse for PredictorError {
    fn into_response(self) -> Response {
        let status = match self {
            PredictorError::Unauthorized => StatusCode::UNAUTHORIZED,
            PredictorError::InvalidRequest(_) | PredictorError::Webhook(_) => StatusCode::BAD_REQUEST,
            PredictorError::NoSuggestions => StatusCode::OK,
            PredictorError::Upstream(_) | PredictorError::HttpError(_) | PredictorError::JsonError(_) => {
                StatusCode::BAD_GATEWAY
            }
            PredictorError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "Request failed: {}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": self.kind(),
            "message": self.user_message(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_upstream_cause() {
        let err = PredictorError::Upstream("401 {\"error\":\"bad key sk-123\"}".to_string());
        assert_eq!(err.kind(), "upstream_error");
        assert!(!err.user_message().contains("sk-123"));
    }

    #[test]
    fn test_invalid_request_is_field_specific() {
        let err = PredictorError::InvalidRequest("Please specify a niche.".to_string());
        assert_eq!(err.user_message(), "Please specify a niche.");
    }
}

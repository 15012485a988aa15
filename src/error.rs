//! Error handling

use axum::{
    extract::rejection::JsonRejection,
    response::{IntoResponse, Response},
    http::{header, HeaderValue, StatusCode},
    Json,
};
use serde_json::json;

use crate::classifier::ClassifyError;

pub type AppResult<T> = Result<T, AppError>;

/// Hint for pollers while the pipeline has nothing to serve
const RETRY_AFTER_SECS: &str = "2";

#[derive(Debug)]
pub enum AppError {
    // Request errors
    ValidationError(String),

    // Pipeline has nothing to serve yet
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::Unavailable(msg) => {
                tracing::debug!("Unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg.as_str())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        let mut response = (status, body).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<ClassifyError> for AppError {
    fn from(err: ClassifyError) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

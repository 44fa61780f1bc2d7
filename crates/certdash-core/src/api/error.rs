use std::sync::Arc;

use thiserror::Error;

use crate::models::ApiResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The access token was rejected and refreshing it failed.
    /// Every request waiting on that refresh receives the same source error.
    #[error("Session expired - please log in again")]
    SessionExpired(#[source] Arc<ApiError>),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Fallback text when the server gives no usable message
const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong";

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Message for an error body: the envelope's `errorMessage` when present,
    /// otherwise the truncated raw body.
    fn body_message(body: &str) -> String {
        serde_json::from_str::<ApiResponse<serde_json::Value>>(body)
            .ok()
            .and_then(|envelope| envelope.message().map(str::to_string))
            .unwrap_or_else(|| Self::truncate_body(body.trim()))
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::body_message(body);
        match status.as_u16() {
            400 | 409 | 422 => ApiError::BadRequest(message),
            401 => ApiError::Unauthorized(message),
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// The caller must log in again before anything else can succeed
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired(_))
    }

    /// Human-readable text suitable for an inline error message
    pub fn user_message(&self) -> String {
        match self {
            ApiError::BadRequest(m)
            | ApiError::Unauthorized(m)
            | ApiError::AccessDenied(m)
            | ApiError::NotFound(m)
            | ApiError::ServerError(m) => {
                if m.is_empty() {
                    GENERIC_FAILURE_MESSAGE.to_string()
                } else {
                    m.clone()
                }
            }
            ApiError::RateLimited => "Too many requests. Please wait and try again.".to_string(),
            ApiError::NetworkError(e) if e.is_timeout() => {
                "Connection timed out. Please try again.".to_string()
            }
            ApiError::NetworkError(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            ApiError::SessionExpired(_) => "Session expired, please log in again".to_string(),
            ApiError::Json(_) | ApiError::InvalidResponse(_) => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

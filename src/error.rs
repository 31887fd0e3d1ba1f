// HTTP API Error Types
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::database::manager::DatabaseError;
use crate::integrations::IntegrationError;

/// HTTP API error with stable status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    Validation {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    // 401 Unauthorized
    Authentication(String),

    // 403 Forbidden
    Authorization(String),

    // 404 Not Found
    NotFound(String),

    // 429 Too Many Requests
    RateLimitExceeded {
        message: String,
        retry_after_secs: u64,
    },

    // 502 Bad Gateway (third-party API failures)
    ExternalApi(String),

    // 500 Internal Server Error
    Database(String),
    Internal(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation { .. } => 400,
            ApiError::Authentication(_) => 401,
            ApiError::Authorization(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::RateLimitExceeded { .. } => 429,
            ApiError::ExternalApi(_) => 502,
            ApiError::Database(_) => 500,
            ApiError::Internal(_) => 500,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::Validation { message, .. } => message,
            ApiError::Authentication(msg) => msg,
            ApiError::Authorization(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::RateLimitExceeded { message, .. } => message,
            ApiError::ExternalApi(msg) => msg,
            ApiError::Database(msg) => msg,
            ApiError::Internal(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::Authentication(_) => "AUTHENTICATION_ERROR",
            ApiError::Authorization(_) => "AUTHORIZATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::ExternalApi(_) => "EXTERNAL_API_ERROR",
            ApiError::Database(_) => "DATABASE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        });

        match self {
            ApiError::Validation { field_errors: Some(field_errors), .. } => {
                response["field_errors"] = json!(field_errors);
            }
            ApiError::RateLimitExceeded { retry_after_secs, .. } => {
                response["retry_after"] = json!(retry_after_secs);
            }
            _ => {}
        }

        response
    }
}

// Static constructor methods
impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            field_errors: None,
        }
    }

    pub fn validation_fields(message: impl Into<String>, field_errors: HashMap<String, String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            field_errors: Some(field_errors),
        }
    }

    /// Single-field validation failure
    pub fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), reason.into());
        Self::validation_fields("Invalid request", field_errors)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        ApiError::Authentication(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        ApiError::Authorization(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        ApiError::RateLimitExceeded {
            message: "Too many requests, please retry later".to_string(),
            retry_after_secs,
        }
    }

    pub fn external_api(message: impl Into<String>) -> Self {
        ApiError::ExternalApi(message.into())
    }

    pub fn database(message: impl Into<String>) -> Self {
        ApiError::Database(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

// Convert other error types to ApiError
impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::InvalidIdentifier(name) => {
                tracing::error!("Rejected SQL identifier: {}", name);
                ApiError::internal("An error occurred while processing your request")
            }
            DatabaseError::ConfigMissing(name) => {
                tracing::error!("Database configuration missing: {}", name);
                ApiError::internal("Service is misconfigured")
            }
            DatabaseError::Migration(e) => {
                tracing::error!("Migration error: {}", e);
                ApiError::database("Database error occurred")
            }
            DatabaseError::Sqlx(sqlx::Error::RowNotFound) => ApiError::not_found("Record not found"),
            DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::database("Database error occurred")
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::from(err).into()
    }
}

impl From<IntegrationError> for ApiError {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::NotConfigured(service) => {
                tracing::warn!("Integration not configured: {}", service);
                ApiError::external_api(format!("{} integration is not configured", service))
            }
            IntegrationError::InvalidSignature => ApiError::validation("Invalid webhook signature"),
            other => {
                tracing::error!("External API error: {}", other);
                ApiError::external_api(other.to_string())
            }
        }
    }
}

impl From<crate::auth::JwtError> for ApiError {
    fn from(err: crate::auth::JwtError) -> Self {
        match err {
            crate::auth::JwtError::Invalid(msg) => {
                tracing::debug!("Rejected session token: {}", msg);
                ApiError::authentication("Invalid or expired session")
            }
            other => {
                tracing::error!("Session token error: {}", other);
                ApiError::internal("Failed to issue session")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {}", err);
        ApiError::internal("Failed to format response")
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.to_json())).into_response();

        if let ApiError::RateLimitExceeded { retry_after_secs, .. } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_kinds_to_stable_statuses() {
        assert_eq!(ApiError::validation("x").status_code(), 400);
        assert_eq!(ApiError::authentication("x").status_code(), 401);
        assert_eq!(ApiError::authorization("x").status_code(), 403);
        assert_eq!(ApiError::not_found("x").status_code(), 404);
        assert_eq!(ApiError::rate_limited(5).status_code(), 429);
        assert_eq!(ApiError::external_api("x").status_code(), 502);
        assert_eq!(ApiError::database("x").status_code(), 500);
        assert_eq!(ApiError::internal("x").status_code(), 500);
    }

    #[test]
    fn rate_limit_body_and_header_carry_retry_after() {
        let body = ApiError::rate_limited(42).to_json();
        assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["retry_after"], 42);

        let response = ApiError::rate_limited(42).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn field_errors_are_serialized() {
        let body = ApiError::invalid_field("email", "Invalid email format").to_json();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field_errors"]["email"], "Invalid email format");
    }

    #[test]
    fn row_not_found_becomes_404() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn database_details_are_not_leaked() {
        let err: ApiError = sqlx::Error::Protocol("relation \"secret\" missing".to_string()).into();
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(!err.message().contains("secret"));
    }
}

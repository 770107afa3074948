//! Shared API types
//!
//! Error rendering shared by all endpoints.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::domain::history::{QueryError, QueryErrorKind};

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    NotFound { code: String, message: String },
    Forbidden { code: String, message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn forbidden(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Machine-readable code for a query failure
fn query_error_code(e: &QueryError) -> &'static str {
    match e {
        QueryError::UnknownTopic(_) => "UNKNOWN_TOPIC",
        QueryError::TopicDenied => "TOPIC_DENIED",
        QueryError::FieldDenied => "FIELD_DENIED",
        QueryError::UnknownField(_) => "UNKNOWN_FIELD",
        QueryError::NotNumeric(_) => "FIELD_NOT_NUMERIC",
        QueryError::ReservedField(_) => "RESERVED_FIELD",
        QueryError::InvalidInterval => "INVALID_INTERVAL",
        QueryError::InvalidAggregation => "INVALID_AGGREGATION",
        QueryError::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
        QueryError::InvalidLimit { .. } => "INVALID_LIMIT",
        QueryError::Store(_) => "INTERNAL",
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        let code = query_error_code(&e);
        match e.kind() {
            QueryErrorKind::NotFound => Self::not_found(code, e.to_string()),
            QueryErrorKind::BadRequest => Self::bad_request(code, e.to_string()),
            QueryErrorKind::Forbidden => Self::forbidden(code, e.to_string()),
            QueryErrorKind::Internal => {
                tracing::error!(error = %e, "History query failed");
                Self::internal("Database operation failed")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, "bad_request", code, message)
            }
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, "not_found", code, message),
            Self::Forbidden { code, message } => {
                (StatusCode::FORBIDDEN, "forbidden", code, message)
            }
            Self::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "INTERNAL".to_string(),
                message,
            ),
        };
        (
            status,
            Json(serde_json::json!({
                "error": error_type,
                "code": code,
                "message": message
            })),
        )
            .into_response()
    }
}

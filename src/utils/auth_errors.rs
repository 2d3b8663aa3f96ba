// API error taxonomy
// Collaborator errors are mapped to these kinds at component boundaries;
// the response body never carries driver detail or secrets

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::models::user::UserError;
use crate::services::jwt::JwtError;
use crate::services::keys::KeyError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("Resource already exists")]
    Conflict,

    #[error("Too many requests")]
    RateLimited {
        limit: u64,
        window: u64,
        retry_after: u64,
    },

    #[error("Service temporarily unavailable")]
    DependencyUnavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

/// Wire shape of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub error: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidArgument(_) => "invalid_argument",
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict => "conflict",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::DependencyUnavailable(_) => "dependency_unavailable",
            ApiError::Internal(_) => "internal",
        }
    }

    /// Short title shown to the caller; internal detail stays in the logs
    fn title(&self) -> String {
        match self {
            ApiError::DependencyUnavailable(_) => "Service temporarily unavailable".to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "Internal error");
            },
            ApiError::DependencyUnavailable(detail) => {
                tracing::warn!(detail = %detail, "Dependency unavailable");
            },
            _ => {},
        }

        let body = ErrorBody {
            kind: self.kind(),
            error: self.title(),
        };

        let mut response = (self.status_code(), Json(body)).into_response();

        if let ApiError::RateLimited {
            limit,
            window,
            retry_after,
        } = self
        {
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", numeric_header(limit));
            headers.insert("X-RateLimit-Window", numeric_header(window));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
            headers.insert(header::RETRY_AFTER, numeric_header(retry_after));
        }

        response
    }
}

fn numeric_header(value: u64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound => ApiError::NotFound("User not found"),
            UserError::DuplicateEmail => ApiError::Conflict,
            UserError::InvalidArgument { field, reason } => {
                ApiError::InvalidArgument(format!("{}: {}", field, reason))
            },
            UserError::Database(e) => ApiError::Internal(e.to_string()),
            UserError::Pool(e) => ApiError::DependencyUnavailable(e),
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::Unauthenticated("Token has expired"),
            JwtError::Malformed(detail) => {
                tracing::debug!(detail = %detail, "Malformed token");
                ApiError::Unauthenticated("Malformed token")
            },
            JwtError::InvalidSignature => ApiError::Unauthenticated("Invalid token signature"),
            JwtError::WrongAudience => ApiError::Unauthenticated("Token audience mismatch"),
            JwtError::WrongIssuer => ApiError::Unauthenticated("Token issuer mismatch"),
            JwtError::Key(KeyError::Unknown(detail)) => {
                tracing::debug!(detail = %detail, "Unknown signing key");
                ApiError::Unauthenticated("Unrecognized signing key")
            },
            JwtError::Key(KeyError::Unavailable(detail)) => {
                ApiError::DependencyUnavailable(detail)
            },
            JwtError::Encoding(detail) => ApiError::Internal(detail),
        }
    }
}

/// Structured audit record for destructive account operations
pub fn log_account_deletion(user_id: &str, email: &str, reviews_deleted: usize) {
    tracing::info!(
        user_id = user_id,
        email = email,
        reviews_deleted = reviews_deleted,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "Account deleted"
    );
}

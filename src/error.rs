use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::Operation;
use crate::bank::BankError;

/// Every failure a client can see.
///
/// The `Display` text is the human-readable `message` of the JSON body; the
/// machine-readable `error` tag comes from [`ApiError::tag`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Only {allowed} requests are allowed")]
    MethodNotAllowed { allowed: String },

    #[error("{0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded")]
    TooManyRequests { retry_after: u64 },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{}", .operation.failure_message())]
    Internal { operation: Operation },
}

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    /// Seconds until the rate-limit window resets. Only on 429.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ApiError::MethodNotAllowed { .. } => "Method not allowed",
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::TooManyRequests { .. } => "Too Many Requests",
            ApiError::BadRequest(_) => "Bad Request",
            ApiError::NotFound(_) => "Not Found",
            ApiError::Internal { .. } => "Internal Server Error",
        }
    }

    /// Attach the failing operation to a bank error. Store failures are
    /// logged here and reduced to the operation's generic message.
    pub fn from_bank(err: BankError, operation: Operation) -> Self {
        match err {
            BankError::BadRequest(message) => ApiError::BadRequest(message),
            BankError::NotFound(message) => ApiError::NotFound(message),
            BankError::Store(e) => {
                log::error!("Error in {}: {}", operation.name(), e);
                ApiError::Internal { operation }
            }
        }
    }

    fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.tag().to_string(),
            message: self.to_string(),
            retry_after: match self {
                ApiError::TooManyRequests { retry_after } => Some(*retry_after),
                _ => None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.body());
        match self {
            ApiError::TooManyRequests { retry_after } => (
                status,
                [(header::RETRY_AFTER, retry_after.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

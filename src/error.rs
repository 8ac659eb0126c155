//! Error taxonomy shared by the pipeline and its HTTP surface.
//!
//! Every denial carries a short reason and a stable code so the client can
//! render an actionable message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::store::StoreError;

/// Why an intentional denial happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    QuotaExhausted,
    ModerationRejected,
    DebateClosed,
    OptionsLocked,
    InvalidTransition,
}

impl PolicyKind {
    pub fn code(&self) -> &'static str {
        match self {
            PolicyKind::QuotaExhausted => "QUOTA_EXHAUSTED",
            PolicyKind::ModerationRejected => "MODERATION_REJECTED",
            PolicyKind::DebateClosed => "DEBATE_CLOSED",
            PolicyKind::OptionsLocked => "OPTIONS_LOCKED",
            PolicyKind::InvalidTransition => "INVALID_TRANSITION",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            PolicyKind::QuotaExhausted => StatusCode::TOO_MANY_REQUESTS,
            // Moderation refusals are reported as a bad submission
            PolicyKind::ModerationRejected => StatusCode::BAD_REQUEST,
            PolicyKind::DebateClosed | PolicyKind::OptionsLocked => StatusCode::FORBIDDEN,
            PolicyKind::InvalidTransition => StatusCode::CONFLICT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    /// The record already exists
    #[error("{0}")]
    Conflict(String),

    /// Concurrent writes to the same record kept winning; retrying may succeed
    #[error("{0}")]
    Contended(String),

    /// Every drawn slug collided with an existing debate
    #[error("Could not allocate a unique address for this debate")]
    SlugExhausted,

    #[error("{reason}")]
    Policy { kind: PolicyKind, reason: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Unauthorized")]
    Unauthorized,

    /// A required external dependency is not available right now
    #[error("{0}")]
    Unavailable(String),

    /// An external dependency answered with something unusable
    #[error("{0}")]
    Upstream(String),

    #[error("storage failure: {0}")]
    Internal(#[from] StoreError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn policy(kind: PolicyKind, reason: impl Into<String>) -> Self {
        ApiError::Policy {
            kind,
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) | ApiError::Contended(_) => StatusCode::CONFLICT,
            ApiError::SlugExhausted => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Policy { kind, .. } => kind.status(),
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION",
            ApiError::Conflict(_) => "DUPLICATE",
            ApiError::Contended(_) => "CONTENDED",
            ApiError::SlugExhausted => "SLUG_EXHAUSTED",
            ApiError::Policy { kind, .. } => kind.code(),
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Unavailable(_) => "DRAFT_UNAVAILABLE",
            ApiError::Upstream(_) => "DRAFT_FAILED",
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Request failed on storage");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (
            status,
            Json(ErrorBody {
                error,
                code: self.code(),
            }),
        )
            .into_response()
    }
}

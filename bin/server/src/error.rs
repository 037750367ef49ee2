//! HTTP error taxonomy.
//!
//! Library errors arrive as typed enums, usually wrapped in a rootcause
//! `Report`. Each is mapped once, here, to an [`ApiError`] kind with a
//! user-safe message. Every failure response has the body
//! `{"success": false, "message": "..."}`.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use coursehub_catalog::{CatalogError, PaymentError, PurchaseError, StoreError, VideoError};
use coursehub_core::ParseIdError;
use coursehub_platform_access::{AuthenticationError, AuthorizationError, VerificationError};
use rootcause::Report;
use std::fmt;
use tracing::{error, warn};

/// An error returned to an HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No valid credentials or no session.
    Unauthenticated(String),
    /// Authenticated, but the role is not permitted.
    Forbidden(String),
    /// The caller already owns the course.
    AlreadyOwned(String),
    /// The course does not exist.
    CourseNotFound(String),
    /// The payment has not succeeded.
    PaymentNotConfirmed(String),
    /// Anything else that does not exist, or is hidden from the caller.
    NotFound(String),
    /// The request was malformed.
    Validation(String),
    /// A backing service failed.
    UpstreamFailure(String),
    /// The client exceeded its request budget; retry after the given seconds.
    TooManyRequests { message: String, retry_after_secs: u64 },
}

impl ApiError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::AlreadyOwned(_) | Self::PaymentNotConfirmed(_) | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::CourseNotFound(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Unauthenticated(m)
            | Self::Forbidden(m)
            | Self::AlreadyOwned(m)
            | Self::CourseNotFound(m)
            | Self::PaymentNotConfirmed(m)
            | Self::NotFound(m)
            | Self::Validation(m)
            | Self::UpstreamFailure(m)
            | Self::TooManyRequests { message: m, .. } => m,
        }
    }

    fn upstream(details: impl fmt::Display) -> Self {
        error!(error = %details, "upstream failure");
        Self::UpstreamFailure("Service temporarily unavailable".to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status_code(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "message": self.message(),
        });
        let mut response = (self.status_code(), Json(body)).into_response();
        if let Self::TooManyRequests {
            retry_after_secs, ..
        } = self
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

impl From<&AuthenticationError> for ApiError {
    fn from(e: &AuthenticationError) -> Self {
        match e {
            AuthenticationError::MissingAccessToken => {
                Self::Unauthenticated("Access token not found. Please login.".to_string())
            }
            AuthenticationError::InvalidAccessToken {
                reason: VerificationError::Expired,
            } => Self::Unauthenticated("Access token has expired. Please refresh.".to_string()),
            AuthenticationError::InvalidAccessToken {
                reason: VerificationError::Malformed { .. },
            } => Self::Unauthenticated("Access token is not valid".to_string()),
            AuthenticationError::MissingRefreshToken
            | AuthenticationError::InvalidRefreshToken { .. } => {
                Self::Unauthenticated("Could not refresh token".to_string())
            }
            AuthenticationError::SessionNotFound { .. } => {
                Self::Unauthenticated("Please login to access this resource".to_string())
            }
            AuthenticationError::SessionStoreUnavailable { .. }
            | AuthenticationError::TokenIssue { .. } => Self::upstream(e),
        }
    }
}

impl From<Report<AuthenticationError>> for ApiError {
    fn from(report: Report<AuthenticationError>) -> Self {
        Self::from(report.current_context())
    }
}

impl From<AuthorizationError> for ApiError {
    fn from(e: AuthorizationError) -> Self {
        Self::Forbidden(e.to_string())
    }
}

impl From<Report<PurchaseError>> for ApiError {
    fn from(report: Report<PurchaseError>) -> Self {
        match report.current_context() {
            PurchaseError::PaymentNotConfirmed { intent_id, status } => {
                warn!(%intent_id, %status, "purchase with unconfirmed payment");
                Self::PaymentNotConfirmed("Thanh toán chưa được xác nhận.".to_string())
            }
            PurchaseError::AlreadyOwned { .. } => {
                Self::AlreadyOwned("Bạn đã mua khóa học này rồi.".to_string())
            }
            PurchaseError::CourseNotFound { .. } => {
                Self::CourseNotFound("Không tìm thấy khóa học.".to_string())
            }
            PurchaseError::UserNotFound { .. } => {
                Self::Unauthenticated("Please login to access this resource".to_string())
            }
            e @ (PurchaseError::PaymentUnavailable { .. } | PurchaseError::Store(_)) => {
                Self::upstream(e)
            }
        }
    }
}

impl From<Report<CatalogError>> for ApiError {
    fn from(report: Report<CatalogError>) -> Self {
        match report.current_context() {
            CatalogError::CourseNotFound { .. } => {
                Self::CourseNotFound("Course not found".to_string())
            }
            CatalogError::NotOwned { .. } => {
                Self::NotFound("You do not have access to this course".to_string())
            }
            CatalogError::ContentNotFound { .. } => {
                Self::Validation("Invalid content id".to_string())
            }
            CatalogError::QuestionNotFound { .. } => {
                Self::Validation("Invalid question id".to_string())
            }
            CatalogError::ReviewNotFound { .. } => Self::NotFound("Review not found".to_string()),
            CatalogError::Invalid { reason } => Self::Validation(reason.clone()),
            e @ (CatalogError::Store(_) | CatalogError::CacheWrite { .. }) => Self::upstream(e),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::upstream(e)
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::Rejected { details } => Self::Validation(details),
            other => Self::upstream(other),
        }
    }
}

impl From<VideoError> for ApiError {
    fn from(e: VideoError) -> Self {
        match e {
            VideoError::UnknownVideo { .. } => Self::NotFound("Video not found".to_string()),
            VideoError::Rejected { details } => Self::Validation(details),
            other @ VideoError::Unavailable { .. } => Self::upstream(other),
        }
    }
}

impl From<ParseIdError> for ApiError {
    fn from(e: ParseIdError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

//! Error types for the catalog crate.
//!
//! - `StoreError`: a persistent store call failed
//! - `CatalogError`: course reads and course mutations
//! - `PurchaseError`: the entitlement engine

use coursehub_core::{ContentId, CourseId, QuestionId, ReviewId, UserId};
use std::fmt;

/// Errors from persistent store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or the query failed.
    Unavailable { details: String },
    /// A stored row could not be converted into a domain value.
    Corrupt { details: String },
    /// An update targeted a record that does not exist.
    Missing { entity: &'static str, id: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => write!(f, "store unavailable: {details}"),
            Self::Corrupt { details } => write!(f, "corrupt stored record: {details}"),
            Self::Missing { entity, id } => write!(f, "{entity} {id} does not exist"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from course reads and mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// No course with this id.
    CourseNotFound { course_id: CourseId },
    /// The course has no content section with this id.
    ContentNotFound { content_id: ContentId },
    /// The content section has no question with this id.
    QuestionNotFound { question_id: QuestionId },
    /// The course has no review with this id.
    ReviewNotFound { review_id: ReviewId },
    /// The caller does not own the course.
    NotOwned { user_id: UserId, course_id: CourseId },
    /// Request data failed validation.
    Invalid { reason: String },
    /// The persistent store failed.
    Store(StoreError),
    /// The committed mutation could not be written to the cache.
    CacheWrite { course_id: CourseId, details: String },
}

impl CatalogError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CourseNotFound { course_id } => write!(f, "course {course_id} not found"),
            Self::ContentNotFound { content_id } => {
                write!(f, "content section {content_id} not found")
            }
            Self::QuestionNotFound { question_id } => {
                write!(f, "question {question_id} not found")
            }
            Self::ReviewNotFound { review_id } => write!(f, "review {review_id} not found"),
            Self::NotOwned { course_id, .. } => {
                write!(f, "you do not have access to course {course_id}")
            }
            Self::Invalid { reason } => write!(f, "invalid request: {reason}"),
            Self::Store(e) => write!(f, "{e}"),
            Self::CacheWrite { course_id, details } => {
                write!(f, "failed to cache course {course_id}: {details}")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<StoreError> for CatalogError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Errors from purchase completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    /// The payment intent exists but has not succeeded.
    PaymentNotConfirmed { intent_id: String, status: String },
    /// The payment processor could not be consulted.
    PaymentUnavailable { details: String },
    /// The buyer has no user record.
    UserNotFound { user_id: UserId },
    /// The buyer already owns the course.
    AlreadyOwned { course_id: CourseId },
    /// No course with this id.
    CourseNotFound { course_id: CourseId },
    /// A store call on the critical path failed.
    Store(StoreError),
}

impl fmt::Display for PurchaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PaymentNotConfirmed { intent_id, status } => {
                write!(f, "payment {intent_id} not confirmed (status: {status})")
            }
            Self::PaymentUnavailable { details } => {
                write!(f, "payment processor unavailable: {details}")
            }
            Self::UserNotFound { user_id } => write!(f, "user {user_id} not found"),
            Self::AlreadyOwned { course_id } => {
                write!(f, "course {course_id} has already been purchased")
            }
            Self::CourseNotFound { course_id } => write!(f, "course {course_id} not found"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PurchaseError {}

impl From<StoreError> for PurchaseError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_owned_display_names_course() {
        let course_id = CourseId::new();
        let err = CatalogError::NotOwned {
            user_id: UserId::new(),
            course_id,
        };
        assert!(err.to_string().contains("do not have access"));
        assert!(err.to_string().contains(&course_id.to_string()));
    }

    #[test]
    fn store_error_converts() {
        let err: PurchaseError = StoreError::Unavailable {
            details: "pool timed out".to_string(),
        }
        .into();
        assert!(matches!(err, PurchaseError::Store(_)));
        assert!(err.to_string().contains("pool timed out"));
    }

    #[test]
    fn payment_not_confirmed_display() {
        let err = PurchaseError::PaymentNotConfirmed {
            intent_id: "pi_123".to_string(),
            status: "processing".to_string(),
        };
        assert!(err.to_string().contains("pi_123"));
        assert!(err.to_string().contains("processing"));
    }
}

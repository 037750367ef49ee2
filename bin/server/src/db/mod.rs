//! Postgres repositories for the coursehub platform.
//!
//! This module provides the store ports from `coursehub-catalog` for:
//! - Users and their owned courses
//! - Course documents
//! - Orders
//! - Notifications
//!
//! Ids are stored in their prefixed text form (`usr_…`, `crs_…`).

pub mod course;
pub mod notification;
pub mod order;
pub mod user;

pub use course::CourseRepository;
pub use notification::NotificationRepository;
pub use order::OrderRepository;
pub use user::UserRepository;

use coursehub_catalog::StoreError;
use std::fmt::Display;
use std::str::FromStr;

pub(crate) fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable {
        details: e.to_string(),
    }
}

pub(crate) fn parse_column<T>(column: &str, raw: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse().map_err(|e| StoreError::Corrupt {
        details: format!("invalid {column} '{raw}': {e}"),
    })
}

pub(crate) fn decode_json<T>(column: &str, value: serde_json::Value) -> Result<T, StoreError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
        details: format!("invalid {column}: {e}"),
    })
}

pub(crate) fn encode_json<T: serde::Serialize>(
    column: &str,
    value: &T,
) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Corrupt {
        details: format!("failed to encode {column}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursehub_core::CourseId;

    #[test]
    fn parse_column_reports_bad_ids() {
        let err = parse_column::<CourseId>("course id", "not-an-id").expect_err("invalid");
        assert!(matches!(err, StoreError::Corrupt { details } if details.contains("not-an-id")));

        let id = CourseId::new();
        assert_eq!(
            parse_column::<CourseId>("course id", &id.to_string()).expect("valid"),
            id
        );
    }

    #[test]
    fn decode_json_reports_column() {
        let err = decode_json::<Vec<String>>("benefits", serde_json::json!({"a": 1}))
            .expect_err("not a list");
        assert!(matches!(err, StoreError::Corrupt { details } if details.contains("benefits")));
    }
}

//! HTTP route handlers under `/api/v1`.

pub mod course;
pub mod notification;
pub mod order;
pub mod payment;
pub mod video;

use crate::error::ApiError;
use std::str::FromStr;

/// Parses an identifier taken from a path or body field.
fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = coursehub_core::ParseIdError>,
{
    Ok(raw.parse::<T>()?)
}

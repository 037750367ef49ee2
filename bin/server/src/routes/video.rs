//! Video playback route.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use coursehub_catalog::VideoPlayback;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::RequireAuth;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VideoBody {
    #[serde(rename = "videoId")]
    pub video_id: String,
}

/// Provider video ids are opaque alphanumeric tokens; anything else would
/// change the request path.
fn validate_video_id(raw: &str) -> Result<&str, ApiError> {
    let id = raw.trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ApiError::Validation("Invalid video id".to_string()));
    }
    Ok(id)
}

/// `POST /api/v1/video-url`
pub async fn video_url(
    State(state): State<Arc<AppState>>,
    RequireAuth(_): RequireAuth,
    body: Result<Json<VideoBody>, JsonRejection>,
) -> Result<Json<VideoPlayback>, ApiError> {
    let Json(body) = body?;
    let video_id = validate_video_id(&body.video_id)?;
    Ok(Json(state.video.playback_otp(video_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_ids_are_trimmed_and_checked() {
        assert_eq!(validate_video_id(" a1b2_c3-d4 ").expect("valid"), "a1b2_c3-d4");
        for bad in ["", "  ", "../otp", "a/b", "a?b=c"] {
            assert!(
                matches!(validate_video_id(bad), Err(ApiError::Validation(_))),
                "{bad:?}"
            );
        }
    }
}

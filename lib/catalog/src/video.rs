//! Video playback port.
//!
//! Course videos are hosted by a DRM provider. Playing one needs a
//! short-lived one-time password issued for the video id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifetime of a playback OTP, in seconds.
pub const PLAYBACK_OTP_TTL_SECS: u32 = 300;

/// Credentials the player needs to start playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPlayback {
    pub otp: String,
    pub playback_info: String,
}

/// Errors from the video provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoError {
    /// The provider has no video with this id.
    UnknownVideo { video_id: String },
    /// The provider rejected the request.
    Rejected { details: String },
    /// The provider could not be reached or returned a server error.
    Unavailable { details: String },
}

impl fmt::Display for VideoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownVideo { video_id } => write!(f, "video {video_id} not found"),
            Self::Rejected { details } => write!(f, "video request rejected: {details}"),
            Self::Unavailable { details } => write!(f, "video provider unavailable: {details}"),
        }
    }
}

impl std::error::Error for VideoError {}

/// Issues playback credentials.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Issues an OTP valid for [`PLAYBACK_OTP_TTL_SECS`].
    async fn playback_otp(&self, video_id: &str) -> Result<VideoPlayback, VideoError>;
}

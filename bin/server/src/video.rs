//! VdoCipher playback-OTP client.

use crate::config::VideoConfig;
use async_trait::async_trait;
use coursehub_catalog::{PLAYBACK_OTP_TTL_SECS, VideoError, VideoPlayback, VideoProvider};
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use tracing::{debug, instrument};

/// OTP response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OtpResponse {
    otp: String,
    playback_info: String,
}

/// Error body: `{"message": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Requests playback OTPs with the configured API secret.
pub struct VdoCipherClient {
    http: Client,
    api_secret: String,
    api_base: String,
}

impl VdoCipherClient {
    #[must_use]
    pub fn new(http: Client, config: &VideoConfig) -> Self {
        Self {
            http,
            api_secret: config.api_secret.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    fn otp_url(&self, video_id: &str) -> String {
        format!("{}/videos/{video_id}/otp", self.api_base)
    }
}

/// Maps a non-success response to a video error.
fn classify_failure(status: StatusCode, body: &str, video_id: &str) -> VideoError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::NOT_FOUND => VideoError::UnknownVideo {
            video_id: video_id.to_string(),
        },
        s if s.is_client_error() && s != StatusCode::UNAUTHORIZED && s != StatusCode::FORBIDDEN => {
            VideoError::Rejected { details: message }
        }
        s => VideoError::Unavailable {
            details: format!("{s}: {message}"),
        },
    }
}

#[async_trait]
impl VideoProvider for VdoCipherClient {
    #[instrument(skip(self))]
    async fn playback_otp(&self, video_id: &str) -> Result<VideoPlayback, VideoError> {
        let response = self
            .http
            .post(self.otp_url(video_id))
            .header(header::AUTHORIZATION, format!("Apisecret {}", self.api_secret))
            .header(header::ACCEPT, "application/json")
            .json(&serde_json::json!({ "ttl": PLAYBACK_OTP_TTL_SECS }))
            .send()
            .await
            .map_err(|e| VideoError::Unavailable {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body, video_id));
        }
        let otp: OtpResponse = response.json().await.map_err(|e| VideoError::Unavailable {
            details: format!("invalid response body: {e}"),
        })?;
        debug!("playback otp issued");
        Ok(VideoPlayback {
            otp: otp.otp,
            playback_info: otp.playback_info,
        })
    }
}

impl std::fmt::Debug for VdoCipherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VdoCipherClient")
            .field("api_base", &self.api_base)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> VdoCipherClient {
        VdoCipherClient::new(
            Client::new(),
            &VideoConfig {
                api_secret: "vdo-key".to_string(),
                api_base: "https://dev.vdocipher.com/api/".to_string(),
            },
        )
    }

    #[test]
    fn otp_url_trims_trailing_slash() {
        assert_eq!(
            client().otp_url("abc123"),
            "https://dev.vdocipher.com/api/videos/abc123/otp"
        );
    }

    #[test]
    fn response_body_is_camel_case() {
        let otp: OtpResponse =
            serde_json::from_str(r#"{"otp":"20160313versASE323","playbackInfo":"eyJ2"}"#)
                .expect("deserialize");
        assert_eq!(otp.otp, "20160313versASE323");
        assert_eq!(otp.playback_info, "eyJ2");
    }

    #[test]
    fn missing_video_is_unknown() {
        assert_eq!(
            classify_failure(StatusCode::NOT_FOUND, "{}", "abc"),
            VideoError::UnknownVideo {
                video_id: "abc".to_string()
            }
        );
    }

    #[test]
    fn client_errors_are_rejections_with_provider_message() {
        assert_eq!(
            classify_failure(StatusCode::BAD_REQUEST, r#"{"message":"ttl too large"}"#, "abc"),
            VideoError::Rejected {
                details: "ttl too large".to_string()
            }
        );
    }

    #[test]
    fn bad_credentials_and_server_errors_are_outages() {
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, "{}", "abc"),
            VideoError::Unavailable { .. }
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "upstream", "abc"),
            VideoError::Unavailable { details } if details.contains("upstream")
        ));
    }

    #[test]
    fn debug_redacts_secret() {
        assert!(!format!("{:?}", client()).contains("vdo-key"));
    }
}

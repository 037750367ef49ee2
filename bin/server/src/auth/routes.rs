//! Session routes: current user, token refresh, and logout.

use axum::{Json, extract::State};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use coursehub_platform_access::{IssuedTokens, TokenCodec};
use serde_json::{Value, json};
use std::sync::Arc;
use time::Duration as TimeDuration;
use tracing::info;

use super::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, RequireAuth};
use crate::config::CookieConfig;
use crate::error::ApiError;
use crate::state::AppState;

fn token_cookie(
    name: &'static str,
    value: String,
    max_age: TimeDuration,
    config: &CookieConfig,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(config.secure)
        .same_site(config.same_site.into())
        .max_age(max_age)
        .build()
}

fn expired_cookie(name: &'static str, config: &CookieConfig) -> Cookie<'static> {
    token_cookie(name, String::new(), TimeDuration::ZERO, config)
}

/// Adds both token cookies, each living as long as its token.
#[must_use]
pub fn session_cookies(
    jar: CookieJar,
    tokens: &IssuedTokens,
    codec: &TokenCodec,
    config: &CookieConfig,
) -> CookieJar {
    let access_age = TimeDuration::seconds(codec.access_lifetime().num_seconds());
    let refresh_age = TimeDuration::seconds(codec.refresh_lifetime().num_seconds());
    jar.add(token_cookie(
        ACCESS_TOKEN_COOKIE,
        tokens.access_token.clone(),
        access_age,
        config,
    ))
    .add(token_cookie(
        REFRESH_TOKEN_COOKIE,
        tokens.refresh_token.clone(),
        refresh_age,
        config,
    ))
}

/// `GET /api/v1/me`
pub async fn me(RequireAuth(user): RequireAuth) -> Json<Value> {
    Json(json!({ "success": true, "user": user.user() }))
}

/// `GET /api/v1/refresh`
///
/// Exchanges the refresh cookie for a new token pair. The session must
/// still exist.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    let refresh_token = jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string());
    let (user, tokens) = state
        .authenticator
        .refresh(refresh_token.as_deref())
        .await?;

    let jar = session_cookies(jar, &tokens, state.authenticator.codec(), &state.cookies);
    Ok((
        jar,
        Json(json!({
            "success": true,
            "accessToken": tokens.access_token,
            "user": user,
        })),
    ))
}

/// `GET /api/v1/logout`
///
/// Deletes the session, which revokes every outstanding token, and clears
/// both cookies.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    state.authenticator.revoke(user.user_id()).await?;
    info!(user_id = %user.user_id(), "logged out");

    let jar = jar
        .add(expired_cookie(ACCESS_TOKEN_COOKIE, &state.cookies))
        .add(expired_cookie(REFRESH_TOKEN_COOKIE, &state.cookies));
    Ok((
        jar,
        Json(json!({ "success": true, "message": "Logged out successfully" })),
    ))
}

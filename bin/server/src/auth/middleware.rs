//! Authentication extractors for Axum.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::CookieJar;
use coursehub_platform_access::{AuthenticatedUser, RoleSet, authorize};
use std::marker::PhantomData;
use std::sync::Arc;

use super::ACCESS_TOKEN_COOKIE;
use crate::error::ApiError;
use crate::state::AppState;

/// Extractor for requiring an authenticated user.
///
/// Reads the access-token cookie and runs the authentication gate. The
/// identity carries the session snapshot, not the token claims.
pub struct RequireAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(ACCESS_TOKEN_COOKIE).map(|c| c.value());

        let user = app_state.authenticator.authenticate(token).await?;
        Ok(RequireAuth(user))
    }
}

/// The fixed set of roles a route admits.
pub trait PermittedRoles {
    fn roles() -> RoleSet;
}

/// Admits admins only.
pub struct AdminOnly;

impl PermittedRoles for AdminOnly {
    fn roles() -> RoleSet {
        RoleSet::admin_only()
    }
}

/// Extractor requiring an authenticated user whose role is in `P::roles()`.
pub struct RequireRoles<P>(pub AuthenticatedUser, PhantomData<fn() -> P>);

impl<P> RequireRoles<P> {
    pub fn into_user(self) -> AuthenticatedUser {
        self.0
    }
}

impl<S, P> FromRequestParts<S> for RequireRoles<P>
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
    P: PermittedRoles,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        authorize(Some(&user), &P::roles())?;
        Ok(RequireRoles(user, PhantomData))
    }
}

/// Extractor for requiring an authenticated admin user.
pub struct RequireAdmin(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let admin = RequireRoles::<AdminOnly>::from_request_parts(parts, state).await?;
        Ok(RequireAdmin(admin.into_user()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursehub_platform_access::Role;

    #[test]
    fn markers_name_their_role_sets() {
        assert!(AdminOnly::roles().contains(Role::Admin));
        assert!(!AdminOnly::roles().contains(Role::Learner));
    }
}

//! Authentication and authorization gates.
//!
//! - [`Authenticator`]: turns an access-token cookie value into an
//!   [`AuthenticatedUser`] (token verification, then session lookup), and
//!   manages the session lifecycle (establish, refresh, revoke).
//! - [`authorize`]: checks an identity against a route's permitted roles.
//!
//! The web layer wraps both in extractors.

use crate::error::{AuthenticationError, AuthorizationError};
use crate::role::{Role, RoleSet};
use crate::session::SessionStore;
use crate::token::{IssuedTokens, TokenCodec, TokenKind};
use crate::user::User;
use coursehub_core::{CourseId, UserId};
use rootcause::Report;
use tracing::{debug, instrument, warn};

/// Identity attached to a request after the authentication gate passes.
///
/// Wraps the session snapshot, which is the authority for role and
/// ownership decisions within the request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    user: User,
}

impl AuthenticatedUser {
    /// Creates a new authenticated user context.
    #[must_use]
    pub fn new(user: User) -> Self {
        Self { user }
    }

    /// Returns the authenticated user's ID.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user.id()
    }

    /// Returns the session snapshot.
    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Consumes the context and returns the snapshot.
    #[must_use]
    pub fn into_user(self) -> User {
        self.user
    }

    /// Returns the user's role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.user.role()
    }

    /// Returns true if the user has admin access.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }

    /// Returns true if the snapshot lists the course as owned.
    #[must_use]
    pub fn owns_course(&self, course_id: CourseId) -> bool {
        self.user.owns_course(course_id)
    }
}

/// Verifies credentials and manages the session lifecycle.
#[derive(Debug, Clone)]
pub struct Authenticator {
    codec: TokenCodec,
    sessions: SessionStore,
}

impl Authenticator {
    /// Creates an authenticator.
    #[must_use]
    pub fn new(codec: TokenCodec, sessions: SessionStore) -> Self {
        Self { codec, sessions }
    }

    /// Returns the token codec.
    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Returns the session store.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Runs the authentication gate on an access token.
    ///
    /// Never writes the session.
    ///
    /// # Errors
    ///
    /// - `MissingAccessToken` when no token is presented (no lookup happens)
    /// - `InvalidAccessToken` when verification fails, with the reason
    /// - `SessionNotFound` when the token is valid but the session is gone
    /// - `SessionStoreUnavailable` when the cache cannot be reached
    #[instrument(skip_all)]
    pub async fn authenticate(
        &self,
        access_token: Option<&str>,
    ) -> Result<AuthenticatedUser, Report<AuthenticationError>> {
        let token = access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthenticationError::MissingAccessToken)?;

        let verified = self
            .codec
            .verify(token, TokenKind::Access)
            .map_err(|reason| AuthenticationError::InvalidAccessToken { reason })?;

        let user = self
            .sessions
            .get(verified.user_id)
            .await
            .map_err(AuthenticationError::from)?
            .ok_or(AuthenticationError::SessionNotFound {
                user_id: verified.user_id,
            })?;

        if verified.role != Some(user.role()) {
            // Role changed since the token was minted. The snapshot wins.
            debug!(user_id = %user.id(), "token role differs from session snapshot");
        }

        Ok(AuthenticatedUser::new(user))
    }

    /// Writes the session snapshot and mints a fresh token pair.
    ///
    /// This is the entry point after a successful login and after a refresh.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreUnavailable` if the snapshot cannot be written, or
    /// `TokenIssue` if signing fails.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn establish(&self, user: &User) -> Result<IssuedTokens, Report<AuthenticationError>> {
        let tokens = self
            .codec
            .issue_pair(user)
            .map_err(|e| AuthenticationError::TokenIssue {
                details: e.to_string(),
            })?;
        self.sessions
            .put(user)
            .await
            .map_err(AuthenticationError::from)?;
        debug!("session established");
        Ok(tokens)
    }

    /// Exchanges a refresh token for a new token pair.
    ///
    /// The session must still exist; its snapshot is re-established as is.
    ///
    /// # Errors
    ///
    /// - `MissingRefreshToken` / `InvalidRefreshToken` for bad credentials
    /// - `SessionNotFound` if the user has logged out
    /// - `SessionStoreUnavailable` / `TokenIssue` for infrastructure failures
    #[instrument(skip_all)]
    pub async fn refresh(
        &self,
        refresh_token: Option<&str>,
    ) -> Result<(User, IssuedTokens), Report<AuthenticationError>> {
        let token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthenticationError::MissingRefreshToken)?;

        let verified = self
            .codec
            .verify(token, TokenKind::Refresh)
            .map_err(|reason| AuthenticationError::InvalidRefreshToken { reason })?;

        let user = self
            .sessions
            .get(verified.user_id)
            .await
            .map_err(AuthenticationError::from)?
            .ok_or(AuthenticationError::SessionNotFound {
                user_id: verified.user_id,
            })?;

        let tokens = self.establish(&user).await?;
        Ok((user, tokens))
    }

    /// Deletes the user's session, revoking all outstanding tokens.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreUnavailable` if the cache cannot be reached.
    #[instrument(skip(self))]
    pub async fn revoke(&self, user_id: UserId) -> Result<(), Report<AuthenticationError>> {
        self.sessions.delete(user_id).await.map_err(|e| {
            warn!(error = %e, "failed to delete session");
            AuthenticationError::from(e)
        })?;
        Ok(())
    }
}

/// Runs the authorization gate.
///
/// # Errors
///
/// Returns `RoleNotPermitted` naming the caller's role (or none) when the
/// identity is missing or its role is not in `permitted`.
pub fn authorize(
    identity: Option<&AuthenticatedUser>,
    permitted: &RoleSet,
) -> Result<(), AuthorizationError> {
    match identity {
        Some(user) if permitted.contains(user.role()) => Ok(()),
        Some(user) => Err(AuthorizationError::RoleNotPermitted {
            role: Some(user.role()),
        }),
        None => Err(AuthorizationError::RoleNotPermitted { role: None }),
    }
}

//! Error types for the platform-access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `SessionError`: the session cache could not be read or written
//! - `AuthenticationError`: identity could not be established
//! - `AuthorizationError`: identity established, role not permitted

use crate::role::Role;
use crate::token::VerificationError;
use coursehub_core::UserId;
use std::fmt;

/// Errors from the session store adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The external cache is unreachable or rejected the command.
    Unavailable { details: String },
    /// The stored snapshot could not be decoded as a user.
    CorruptSnapshot { user_id: UserId, details: String },
    /// The user could not be encoded as a snapshot.
    Encode { details: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => {
                write!(f, "session store unavailable: {details}")
            }
            Self::CorruptSnapshot { user_id, details } => {
                write!(f, "corrupt session snapshot for {user_id}: {details}")
            }
            Self::Encode { details } => {
                write!(f, "failed to encode session snapshot: {details}")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors from authentication operations.
///
/// These errors represent failures in verifying user identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// No access token was presented.
    MissingAccessToken,
    /// No refresh token was presented.
    MissingRefreshToken,
    /// The access token failed verification.
    InvalidAccessToken { reason: VerificationError },
    /// The refresh token failed verification.
    InvalidRefreshToken { reason: VerificationError },
    /// The token verified but no session entry exists (logged out or expired).
    SessionNotFound { user_id: UserId },
    /// The session cache could not be consulted.
    SessionStoreUnavailable { details: String },
    /// A token could not be minted.
    TokenIssue { details: String },
}

impl AuthenticationError {
    /// Returns true if the failure came from infrastructure rather than the
    /// caller's credentials.
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::SessionStoreUnavailable { .. } | Self::TokenIssue { .. }
        )
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAccessToken => {
                write!(f, "access token not found, please login")
            }
            Self::MissingRefreshToken => {
                write!(f, "refresh token not found, please login")
            }
            Self::InvalidAccessToken { reason } => {
                write!(f, "invalid access token: {reason}")
            }
            Self::InvalidRefreshToken { reason } => {
                write!(f, "invalid refresh token: {reason}")
            }
            Self::SessionNotFound { user_id } => {
                write!(f, "session not found for {user_id}")
            }
            Self::SessionStoreUnavailable { details } => {
                write!(f, "session store unavailable: {details}")
            }
            Self::TokenIssue { details } => {
                write!(f, "failed to issue token: {details}")
            }
        }
    }
}

impl std::error::Error for AuthenticationError {}

impl From<SessionError> for AuthenticationError {
    fn from(err: SessionError) -> Self {
        match err {
            // An undecodable snapshot cannot identify anyone; the user has to
            // log in again, which overwrites it.
            SessionError::CorruptSnapshot { user_id, .. } => Self::SessionNotFound { user_id },
            SessionError::Unavailable { details } | SessionError::Encode { details } => {
                Self::SessionStoreUnavailable { details }
            }
        }
    }
}

/// Errors from authorization operations.
///
/// These errors represent failures in permission checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The caller's role is not in the route's permitted set. `None` when no
    /// identity was attached to the request.
    RoleNotPermitted { role: Option<Role> },
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoleNotPermitted { role } => {
                let role = role.map_or("undefined", |r| r.as_str());
                write!(f, "Role: {role} is not allowed to access this resource")
            }
        }
    }
}

impl std::error::Error for AuthorizationError {}

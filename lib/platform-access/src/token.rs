//! Credential codec: minting and verifying signed bearer tokens.
//!
//! Access tokens carry `{id, role}` and are short-lived. Refresh tokens carry
//! `{id}` and live for days. The two kinds are signed with independent HS256
//! secrets, so a refresh token never verifies as an access token and vice
//! versa. Verification is purely cryptographic and structural; whether the
//! session still exists is the authentication gate's concern.

use crate::role::Role;
use crate::user::User;
use chrono::{DateTime, Duration, TimeZone, Utc};
use coursehub_core::UserId;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Secrets and lifetimes for both token kinds.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// HS256 secret for access tokens.
    pub access_secret: String,
    /// HS256 secret for refresh tokens. Must differ from the access secret;
    /// [`TokenCodec::new`] rejects a config where they are equal.
    pub refresh_secret: String,
    /// Access token lifetime in hours.
    #[serde(default = "default_access_expire_hours")]
    pub access_expire_hours: i64,
    /// Refresh token lifetime in days.
    #[serde(default = "default_refresh_expire_days")]
    pub refresh_expire_days: i64,
}

fn default_access_expire_hours() -> i64 {
    1
}

fn default_refresh_expire_days() -> i64 {
    7
}

impl TokenConfig {
    /// Creates a config with the default lifetimes.
    #[must_use]
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_expire_hours: default_access_expire_hours(),
            refresh_expire_days: default_refresh_expire_days(),
        }
    }

    /// Returns the access token lifetime.
    #[must_use]
    pub fn access_lifetime(&self) -> Duration {
        Duration::hours(self.access_expire_hours)
    }

    /// Returns the refresh token lifetime.
    #[must_use]
    pub fn refresh_lifetime(&self) -> Duration {
        Duration::days(self.refresh_expire_days)
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"[redacted]")
            .field("refresh_secret", &"[redacted]")
            .field("access_expire_hours", &self.access_expire_hours)
            .field("refresh_expire_days", &self.refresh_expire_days)
            .finish()
    }
}

/// Why a [`TokenConfig`] cannot back a codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenConfigError {
    /// A secret is empty.
    EmptySecret { kind: TokenKind },
    /// Both kinds share one secret, so either token would verify as the other.
    SharedSecret,
    /// A lifetime is zero or negative.
    NonPositiveLifetime { kind: TokenKind },
}

impl fmt::Display for TokenConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySecret { kind } => write!(f, "{kind} token secret is empty"),
            Self::SharedSecret => {
                write!(f, "access and refresh tokens must use different secrets")
            }
            Self::NonPositiveLifetime { kind } => {
                write!(f, "{kind} token lifetime must be positive")
            }
        }
    }
}

impl std::error::Error for TokenConfigError {}

impl TokenConfig {
    /// Checks that the config can back a codec.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), TokenConfigError> {
        if self.access_secret.is_empty() {
            return Err(TokenConfigError::EmptySecret {
                kind: TokenKind::Access,
            });
        }
        if self.refresh_secret.is_empty() {
            return Err(TokenConfigError::EmptySecret {
                kind: TokenKind::Refresh,
            });
        }
        if self.access_secret == self.refresh_secret {
            return Err(TokenConfigError::SharedSecret);
        }
        if self.access_expire_hours <= 0 {
            return Err(TokenConfigError::NonPositiveLifetime {
                kind: TokenKind::Access,
            });
        }
        if self.refresh_expire_days <= 0 {
            return Err(TokenConfigError::NonPositiveLifetime {
                kind: TokenKind::Refresh,
            });
        }
        Ok(())
    }
}

/// Which of the two token kinds is being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => write!(f, "access"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    iat: i64,
    exp: i64,
}

/// Decoded contents of a token that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub user_id: UserId,
    /// Present on access tokens only.
    pub role: Option<Role>,
    pub expires_at: DateTime<Utc>,
}

/// Why a token failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// Signature is valid but the expiry has passed.
    Expired,
    /// Bad signature, wrong structure, or an embedded id that does not parse.
    Malformed { reason: String },
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => write!(f, "token has expired"),
            Self::Malformed { reason } => write!(f, "malformed token: {reason}"),
        }
    }
}

impl std::error::Error for VerificationError {}

impl From<jsonwebtoken::errors::Error> for VerificationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Malformed {
                reason: err.to_string(),
            },
        }
    }
}

/// Error returned when a token cannot be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIssueError {
    pub kind: TokenKind,
    pub details: String,
}

impl fmt::Display for TokenIssueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to sign {} token: {}", self.kind, self.details)
    }
}

impl std::error::Error for TokenIssueError {}

/// A freshly minted token pair.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs and verifies access and refresh tokens.
#[derive(Clone)]
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
    validation: Validation,
}

impl TokenCodec {
    /// Builds a codec from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config fails [`TokenConfig::validate`].
    pub fn new(config: &TokenConfig) -> Result<Self, TokenConfigError> {
        config.validate()?;

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact; the cookie max-age mirrors the token lifetime.
        validation.leeway = 0;
        validation.validate_exp = true;

        Ok(Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_lifetime: config.access_lifetime(),
            refresh_lifetime: config.refresh_lifetime(),
            validation,
        })
    }

    /// Returns the access token lifetime.
    #[must_use]
    pub fn access_lifetime(&self) -> Duration {
        self.access_lifetime
    }

    /// Returns the refresh token lifetime.
    #[must_use]
    pub fn refresh_lifetime(&self) -> Duration {
        self.refresh_lifetime
    }

    /// Mints an access token carrying the user's id and role.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_access_token(&self, user: &User) -> Result<String, TokenIssueError> {
        self.issue_at(TokenKind::Access, user, Utc::now())
    }

    /// Mints a refresh token carrying only the user's id.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_refresh_token(&self, user: &User) -> Result<String, TokenIssueError> {
        self.issue_at(TokenKind::Refresh, user, Utc::now())
    }

    /// Mints both tokens for the user.
    ///
    /// # Errors
    ///
    /// Returns an error if either token cannot be signed.
    pub fn issue_pair(&self, user: &User) -> Result<IssuedTokens, TokenIssueError> {
        Ok(IssuedTokens {
            access_token: self.issue_access_token(user)?,
            refresh_token: self.issue_refresh_token(user)?,
        })
    }

    pub(crate) fn issue_at(
        &self,
        kind: TokenKind,
        user: &User,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenIssueError> {
        let (lifetime, role, key) = match kind {
            TokenKind::Access => (
                self.access_lifetime,
                Some(user.role()),
                &self.access_encoding,
            ),
            TokenKind::Refresh => (self.refresh_lifetime, None, &self.refresh_encoding),
        };
        let claims = Claims {
            id: user.id().to_string(),
            role,
            iat: issued_at.timestamp(),
            exp: (issued_at + lifetime).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, key).map_err(|e| {
            TokenIssueError {
                kind,
                details: e.to_string(),
            }
        })
    }

    /// Verifies a token of the given kind.
    ///
    /// # Errors
    ///
    /// Returns `Expired` if the signature is valid but the token has expired,
    /// and `Malformed` for any other failure.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<VerifiedToken, VerificationError> {
        let key = match kind {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };
        let claims = jsonwebtoken::decode::<Claims>(token, key, &self.validation)?.claims;

        let user_id: UserId = claims
            .id
            .parse()
            .map_err(|e| VerificationError::Malformed {
                reason: format!("invalid id claim: {e}"),
            })?;
        match (kind, &claims.role) {
            (TokenKind::Access, None) => {
                return Err(VerificationError::Malformed {
                    reason: "access token missing role claim".to_string(),
                });
            }
            (TokenKind::Refresh, Some(_)) => {
                return Err(VerificationError::Malformed {
                    reason: "refresh token carries a role claim".to_string(),
                });
            }
            _ => {}
        }
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| VerificationError::Malformed {
                reason: format!("exp claim out of range: {}", claims.exp),
            })?;

        Ok(VerifiedToken {
            user_id,
            role: claims.role,
            expires_at,
        })
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("access_lifetime", &self.access_lifetime)
            .field("refresh_lifetime", &self.refresh_lifetime)
            .finish_non_exhaustive()
    }
}

//! Platform access for coursehub: who is calling, and may they call this.
//!
//! This crate provides:
//! - User accounts with their owned-course set (`User`)
//! - Closed role model (`Role`, `RoleSet`)
//! - Signed access/refresh tokens (`TokenCodec`)
//! - Session snapshots in an external cache (`SessionStore`, `KeyValueCache`)
//! - The authentication and authorization gates (`Authenticator`, `authorize`)
//!
//! # Access Control Model
//!
//! A request is authenticated when its access token verifies *and* a session
//! snapshot exists for the token's user. The snapshot, not the token, is the
//! authority for role and ownership checks, so deleting it revokes access
//! immediately.
//!
//! # Example
//!
//! ```
//! use coursehub_platform_access::{
//!     authorize, Authenticator, MemoryCache, Role, RoleSet, SessionStore, TokenCodec,
//!     TokenConfig, User,
//! };
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let codec = TokenCodec::new(&TokenConfig::new("access-secret", "refresh-secret")).unwrap();
//! let sessions = SessionStore::new(Arc::new(MemoryCache::new()));
//! let auth = Authenticator::new(codec, sessions);
//!
//! let user = User::new("Alice".into(), "alice@example.com".into(), Role::Learner);
//! let tokens = auth.establish(&user).await.unwrap();
//!
//! let identity = auth.authenticate(Some(&tokens.access_token)).await.unwrap();
//! assert!(authorize(Some(&identity), &RoleSet::all()).is_ok());
//! assert!(authorize(Some(&identity), &RoleSet::admin_only()).is_err());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod error;
pub mod role;
pub mod session;
pub mod token;
pub mod user;

// Re-export main types at crate root
pub use auth::{AuthenticatedUser, Authenticator, authorize};
pub use cache::{CacheError, KeyValueCache, MemoryCache};
pub use error::{AuthenticationError, AuthorizationError, SessionError};
pub use role::{Role, RoleSet};
pub use session::SessionStore;
pub use token::{
    IssuedTokens, TokenCodec, TokenConfig, TokenConfigError, TokenIssueError, TokenKind,
    VerificationError, VerifiedToken,
};
pub use user::User;

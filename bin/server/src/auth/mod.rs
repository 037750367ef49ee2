//! Session endpoints and extractors.
//!
//! Login itself happens outside this server: whatever verifies the
//! credentials calls [`Authenticator::establish`] and sets the cookies with
//! [`session_cookies`]. This module reads those cookies, refreshes them and
//! revokes them.
//!
//! [`Authenticator::establish`]: coursehub_platform_access::Authenticator::establish

pub mod middleware;
pub mod routes;

pub use middleware::{AdminOnly, PermittedRoles, RequireAdmin, RequireAuth, RequireRoles};
pub use routes::{logout, me, refresh, session_cookies};

/// Access-token cookie name.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Refresh-token cookie name.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

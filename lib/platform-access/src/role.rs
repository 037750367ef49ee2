//! Role types for platform access control.
//!
//! The platform knows exactly two roles. Learners buy and consume courses;
//! admins additionally manage the catalog and see every order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform role carried by a user record and embedded in access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account that purchases and studies courses.
    Learner,
    /// Administrator with catalog and order oversight.
    Admin,
}

impl Role {
    /// Returns true if this role has admin privileges.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Returns the lowercase wire name of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Learner => "learner",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored role name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learner" | "user" => Ok(Self::Learner),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A fixed set of roles permitted on a route.
///
/// Route permissions are configured once per route, never per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet {
    roles: Vec<Role>,
}

impl RoleSet {
    /// Creates an empty role set (nothing is permitted).
    #[must_use]
    pub fn none() -> Self {
        Self { roles: Vec::new() }
    }

    /// Creates a role set permitting only admins.
    #[must_use]
    pub fn admin_only() -> Self {
        Self {
            roles: vec![Role::Admin],
        }
    }

    /// Creates a role set permitting every role.
    #[must_use]
    pub fn all() -> Self {
        Self {
            roles: vec![Role::Learner, Role::Admin],
        }
    }

    /// Creates a role set from an explicit list, ignoring duplicates.
    #[must_use]
    pub fn of(roles: &[Role]) -> Self {
        let mut set = Self::none();
        for role in roles {
            if !set.roles.contains(role) {
                set.roles.push(*role);
            }
        }
        set
    }

    /// Returns true if the role is a member of this set.
    #[must_use]
    pub fn contains(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Returns the roles as a slice.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}

impl Default for RoleSet {
    fn default() -> Self {
        Self::none()
    }
}

//! User domain type.
//!
//! The User is the authoritative account record. A JSON snapshot of it is
//! mirrored into the session cache, so the serialized form is part of the
//! session contract.

use crate::role::Role;
use chrono::{DateTime, Utc};
use coursehub_core::{CourseId, UserId};
use serde::{Deserialize, Serialize};

/// A platform account together with the courses it is entitled to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Internal platform user ID.
    id: UserId,
    /// Display name.
    name: String,
    /// Email address used for order confirmations and Q&A replies.
    email: String,
    /// Platform role.
    role: Role,
    /// Owned courses, in the order they were granted. Never holds duplicates.
    #[serde(default)]
    courses: Vec<CourseId>,
    /// When the user record was created.
    created_at: DateTime<Utc>,
    /// When the user record was last updated.
    updated_at: DateTime<Utc>,
}

impl User {
    /// Creates a new user that owns no courses.
    #[must_use]
    pub fn new(name: String, email: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            name,
            email,
            role,
            courses: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a user with all fields specified.
    ///
    /// Use this when reconstituting a user from storage. Duplicate course
    /// entries are collapsed, keeping the first occurrence.
    #[must_use]
    pub fn with_all_fields(
        id: UserId,
        name: String,
        email: String,
        role: Role,
        courses: Vec<CourseId>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let mut user = Self {
            id,
            name,
            email,
            role,
            courses: Vec::with_capacity(courses.len()),
            created_at,
            updated_at,
        };
        for course in courses {
            if !user.courses.contains(&course) {
                user.courses.push(course);
            }
        }
        user
    }

    /// Returns the user's internal platform ID.
    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the email address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the user's role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns true if the user is an admin.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Returns the owned courses in grant order.
    #[must_use]
    pub fn courses(&self) -> &[CourseId] {
        &self.courses
    }

    /// Returns true if the user owns the course.
    #[must_use]
    pub fn owns_course(&self, course_id: CourseId) -> bool {
        self.courses.contains(&course_id)
    }

    /// Adds a course to the owned set.
    ///
    /// Returns `false` without modifying the user when the course is already
    /// owned.
    pub fn grant_course(&mut self, course_id: CourseId) -> bool {
        if self.owns_course(course_id) {
            return false;
        }
        self.courses.push(course_id);
        self.updated_at = Utc::now();
        true
    }

    /// Returns when the user was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the user was last updated.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Sets the user's display name.
    pub fn set_name(&mut self, name: String) {
        self.name = name;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learner() -> User {
        User::new(
            "Alice".to_string(),
            "alice@example.com".to_string(),
            Role::Learner,
        )
    }

    #[test]
    fn new_user_owns_nothing() {
        let user = learner();
        assert_eq!(user.name(), "Alice");
        assert_eq!(user.email(), "alice@example.com");
        assert_eq!(user.role(), Role::Learner);
        assert!(!user.is_admin());
        assert!(user.courses().is_empty());
        assert_eq!(user.created_at(), user.updated_at());
    }

    #[test]
    fn grant_course_is_idempotent() {
        let mut user = learner();
        let course = CourseId::new();

        assert!(user.grant_course(course));
        assert!(user.owns_course(course));
        assert!(!user.grant_course(course));
        assert_eq!(user.courses(), &[course]);
    }

    #[test]
    fn grant_course_preserves_order() {
        let mut user = learner();
        let first = CourseId::new();
        let second = CourseId::new();

        user.grant_course(first);
        user.grant_course(second);
        assert_eq!(user.courses(), &[first, second]);
    }

    #[test]
    fn with_all_fields_collapses_duplicates() {
        let course = CourseId::new();
        let other = CourseId::new();
        let now = Utc::now();
        let user = User::with_all_fields(
            UserId::new(),
            "Bob".to_string(),
            "bob@example.com".to_string(),
            Role::Admin,
            vec![course, other, course],
            now,
            now,
        );

        assert_eq!(user.courses(), &[course, other]);
        assert!(user.is_admin());
    }

    #[test]
    fn set_name_updates_timestamp() {
        let mut user = learner();
        let original = user.updated_at();

        std::thread::sleep(std::time::Duration::from_millis(10));
        user.set_name("Alice B.".to_string());

        assert_eq!(user.name(), "Alice B.");
        assert!(user.updated_at() > original);
    }

    #[test]
    fn snapshot_roundtrips_through_json() {
        let mut user = learner();
        user.grant_course(CourseId::new());

        let json = serde_json::to_string(&user).expect("serialize");
        let restored: User = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, user);
    }
}

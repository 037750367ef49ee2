//! Persistent store ports.
//!
//! These traits abstract the document store so the purchase flow and course
//! service can be tested without a database. The server provides Postgres
//! implementations; [`crate::memory`] provides in-process ones.

use crate::course::Course;
use crate::error::StoreError;
use crate::notification::Notification;
use crate::order::Order;
use async_trait::async_trait;
use coursehub_core::{CourseId, NotificationId, UserId};
use coursehub_platform_access::User;

/// Result of an atomic add-course-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The course was added; carries the user as committed.
    Granted(User),
    /// The user already owned the course. Nothing was written.
    AlreadyOwned,
    /// No user with this id.
    UserNotFound,
}

/// User accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Loads a user.
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Inserts a new user.
    async fn insert(&self, user: &User) -> Result<(), StoreError>;

    /// Adds `course_id` to the user's owned set if, and only if, it is not
    /// already present, as a single atomic operation.
    ///
    /// Two concurrent grants of the same course must yield exactly one
    /// `Granted`.
    async fn grant_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<GrantOutcome, StoreError>;
}

/// Course documents.
#[async_trait]
pub trait CourseStore: Send + Sync {
    /// Loads a course.
    async fn find_by_id(&self, id: CourseId) -> Result<Option<Course>, StoreError>;

    /// Lists all courses, newest first.
    async fn list(&self) -> Result<Vec<Course>, StoreError>;

    /// Inserts a new course.
    async fn insert(&self, course: &Course) -> Result<(), StoreError>;

    /// Replaces an existing course document and returns it as committed.
    ///
    /// The purchase counter is owned by [`CourseStore::increment_purchased`]:
    /// `update` keeps the stored value and ignores `course.purchased`, and the
    /// returned course carries the stored counter.
    ///
    /// Returns `StoreError::Missing` if the course does not exist.
    async fn update(&self, course: &Course) -> Result<Course, StoreError>;

    /// Deletes a course. Returns false if it did not exist.
    async fn delete(&self, id: CourseId) -> Result<bool, StoreError>;

    /// Atomically adds one to the purchase counter and returns the updated
    /// course, or `None` if it does not exist.
    async fn increment_purchased(&self, id: CourseId) -> Result<Option<Course>, StoreError>;
}

/// Purchase records.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order.
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    /// Lists all orders, newest first.
    async fn list(&self) -> Result<Vec<Order>, StoreError>;
}

/// Notification feed.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persists a notification. Inserting an id that already exists is a
    /// no-op, so redelivered side effects do not duplicate entries.
    async fn insert(&self, notification: &Notification) -> Result<(), StoreError>;

    /// Lists all notifications, newest first.
    async fn list(&self) -> Result<Vec<Notification>, StoreError>;

    /// Marks a notification as read and returns it, or `None` if absent.
    async fn mark_read(&self, id: NotificationId) -> Result<Option<Notification>, StoreError>;
}

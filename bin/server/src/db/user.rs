//! User repository.

use super::{parse_column, unavailable};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coursehub_catalog::{GrantOutcome, StoreError, UserStore};
use coursehub_core::{CourseId, UserId};
use coursehub_platform_access::{Role, User};
use sqlx::{FromRow, PgPool};
use tracing::instrument;

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    role: String,
    courses: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_user(self) -> Result<User, StoreError> {
        let id: UserId = parse_column("user id", &self.id)?;
        let role: Role = parse_column("role", &self.role)?;
        let courses = self
            .courses
            .iter()
            .map(|raw| parse_column::<CourseId>("course id", raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(User::with_all_fields(
            id,
            self.name,
            self.email,
            role,
            courses,
            self.created_at,
            self.updated_at,
        ))
    }
}

/// Repository for user operations.
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new user repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, name, email, role, courses, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.map(UserRow::try_into_user).transpose()
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let courses: Vec<String> = user.courses().iter().map(ToString::to_string).collect();
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, role, courses, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id().to_string())
        .bind(user.name())
        .bind(user.email())
        .bind(user.role().as_str())
        .bind(&courses)
        .bind(user.created_at())
        .bind(user.updated_at())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    /// The append and the ownership test are one statement, so concurrent
    /// grants of the same course cannot both match.
    #[instrument(skip(self))]
    async fn grant_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<GrantOutcome, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            UPDATE users
            SET courses = array_append(courses, $2), updated_at = now()
            WHERE id = $1 AND NOT ($2 = ANY(courses))
            RETURNING id, name, email, role, courses, created_at, updated_at
            "#,
        )
        .bind(user_id.to_string())
        .bind(course_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        if let Some(row) = row {
            return Ok(GrantOutcome::Granted(row.try_into_user()?));
        }

        // Nothing matched: either the user is missing or already owns it.
        match self.find_by_id(user_id).await? {
            Some(_) => Ok(GrantOutcome::AlreadyOwned),
            None => Ok(GrantOutcome::UserNotFound),
        }
    }
}

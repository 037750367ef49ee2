//! Notification repository.

use super::{parse_column, unavailable};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coursehub_catalog::{Notification, NotificationStore, StoreError};
use coursehub_core::NotificationId;
use sqlx::{FromRow, PgPool};

/// Row type for notification queries.
#[derive(FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    title: String,
    message: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    fn try_into_notification(self) -> Result<Notification, StoreError> {
        Ok(Notification {
            id: parse_column("notification id", &self.id)?,
            user_id: parse_column("user id", &self.user_id)?,
            title: self.title,
            message: self.message,
            status: parse_column("status", &self.status)?,
            created_at: self.created_at,
        })
    }
}

/// Repository for the notification feed.
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    /// Creates a new notification repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    /// Redelivered side effects carry the same id and are ignored.
    async fn insert(&self, notification: &Notification) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, message, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(notification.id.to_string())
        .bind(notification.user_id.to_string())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.status.as_str())
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Notification>, StoreError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, title, message, status, created_at
            FROM notifications
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter()
            .map(NotificationRow::try_into_notification)
            .collect()
    }

    async fn mark_read(&self, id: NotificationId) -> Result<Option<Notification>, StoreError> {
        let row: Option<NotificationRow> = sqlx::query_as(
            r#"
            UPDATE notifications
            SET status = 'read'
            WHERE id = $1
            RETURNING id, user_id, title, message, status, created_at
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.map(NotificationRow::try_into_notification).transpose()
    }
}

//! Order repository.

use super::{parse_column, unavailable};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coursehub_catalog::{Order, OrderStore, StoreError};
use sqlx::{FromRow, PgPool};

/// Row type for order queries.
#[derive(FromRow)]
struct OrderRow {
    id: String,
    user_id: String,
    course_id: String,
    payment_intent_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl OrderRow {
    fn try_into_order(self) -> Result<Order, StoreError> {
        Ok(Order {
            id: parse_column("order id", &self.id)?,
            user_id: parse_column("user id", &self.user_id)?,
            course_id: parse_column("course id", &self.course_id)?,
            payment_intent_id: self.payment_intent_id,
            created_at: self.created_at,
        })
    }
}

/// Repository for purchase records.
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    /// Creates a new order repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, course_id, payment_intent_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order.id.to_string())
        .bind(order.user_id.to_string())
        .bind(order.course_id.to_string())
        .bind(order.payment_intent_id.as_deref())
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, course_id, payment_intent_id, created_at
            FROM orders
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter().map(OrderRow::try_into_order).collect()
    }
}

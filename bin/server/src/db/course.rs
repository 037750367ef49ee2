//! Course repository.

use super::{decode_json, encode_json, parse_column, unavailable};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coursehub_catalog::{Course, CourseStore, StoreError};
use coursehub_core::CourseId;
use sqlx::{FromRow, PgPool};
use tracing::instrument;

const COURSE_COLUMNS: &str = "id, name, description, price, estimated_price, tags, level, \
     demo_url, benefits, prerequisites, purchased, rating, reviews, content, created_at, \
     updated_at";

/// Row type for course queries.
#[derive(FromRow)]
struct CourseRow {
    id: String,
    name: String,
    description: String,
    price: i64,
    estimated_price: Option<i64>,
    tags: String,
    level: String,
    demo_url: String,
    benefits: serde_json::Value,
    prerequisites: serde_json::Value,
    purchased: i64,
    rating: f64,
    reviews: serde_json::Value,
    content: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CourseRow {
    fn try_into_course(self) -> Result<Course, StoreError> {
        Ok(Course {
            id: parse_column("course id", &self.id)?,
            name: self.name,
            description: self.description,
            price: self.price,
            estimated_price: self.estimated_price,
            tags: self.tags,
            level: self.level,
            demo_url: self.demo_url,
            benefits: decode_json("benefits", self.benefits)?,
            prerequisites: decode_json("prerequisites", self.prerequisites)?,
            purchased: self.purchased,
            rating: self.rating,
            reviews: decode_json("reviews", self.reviews)?,
            content: decode_json("content", self.content)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Document columns encoded for binding.
struct EncodedDocuments {
    benefits: serde_json::Value,
    prerequisites: serde_json::Value,
    reviews: serde_json::Value,
    content: serde_json::Value,
}

impl EncodedDocuments {
    fn of(course: &Course) -> Result<Self, StoreError> {
        Ok(Self {
            benefits: encode_json("benefits", &course.benefits)?,
            prerequisites: encode_json("prerequisites", &course.prerequisites)?,
            reviews: encode_json("reviews", &course.reviews)?,
            content: encode_json("content", &course.content)?,
        })
    }
}

/// Repository for course documents.
pub struct CourseRepository {
    pool: PgPool,
}

impl CourseRepository {
    /// Creates a new course repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseStore for CourseRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: CourseId) -> Result<Option<Course>, StoreError> {
        let row: Option<CourseRow> =
            sqlx::query_as(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        row.map(CourseRow::try_into_course).transpose()
    }

    async fn list(&self) -> Result<Vec<Course>, StoreError> {
        let rows: Vec<CourseRow> = sqlx::query_as(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter().map(CourseRow::try_into_course).collect()
    }

    async fn insert(&self, course: &Course) -> Result<(), StoreError> {
        let docs = EncodedDocuments::of(course)?;
        sqlx::query(&format!(
            "INSERT INTO courses ({COURSE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(course.id.to_string())
        .bind(&course.name)
        .bind(&course.description)
        .bind(course.price)
        .bind(course.estimated_price)
        .bind(&course.tags)
        .bind(&course.level)
        .bind(&course.demo_url)
        .bind(docs.benefits)
        .bind(docs.prerequisites)
        .bind(course.purchased)
        .bind(course.rating)
        .bind(docs.reviews)
        .bind(docs.content)
        .bind(course.created_at)
        .bind(course.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    /// Replaces the document and returns the committed row. The purchase
    /// counter is left alone so an edit cannot overwrite a concurrent
    /// increment.
    #[instrument(skip(self, course), fields(course_id = %course.id))]
    async fn update(&self, course: &Course) -> Result<Course, StoreError> {
        let docs = EncodedDocuments::of(course)?;
        let row: Option<CourseRow> = sqlx::query_as(&format!(
            "UPDATE courses \
             SET name = $2, description = $3, price = $4, estimated_price = $5, tags = $6, \
                 level = $7, demo_url = $8, benefits = $9, prerequisites = $10, rating = $11, \
                 reviews = $12, content = $13, updated_at = $14 \
             WHERE id = $1 \
             RETURNING {COURSE_COLUMNS}"
        ))
        .bind(course.id.to_string())
        .bind(&course.name)
        .bind(&course.description)
        .bind(course.price)
        .bind(course.estimated_price)
        .bind(&course.tags)
        .bind(&course.level)
        .bind(&course.demo_url)
        .bind(docs.benefits)
        .bind(docs.prerequisites)
        .bind(course.rating)
        .bind(docs.reviews)
        .bind(docs.content)
        .bind(course.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.ok_or_else(|| StoreError::Missing {
            entity: "course",
            id: course.id.to_string(),
        })?
        .try_into_course()
    }

    async fn delete(&self, id: CourseId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn increment_purchased(&self, id: CourseId) -> Result<Option<Course>, StoreError> {
        let row: Option<CourseRow> = sqlx::query_as(&format!(
            "UPDATE courses SET purchased = purchased + 1 WHERE id = $1 \
             RETURNING {COURSE_COLUMNS}"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.map(CourseRow::try_into_course).transpose()
    }
}

//! Course catalog, content, reviews, and Q&A routes.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use coursehub_catalog::{CourseInput, CourseUpdate};
use coursehub_core::{ContentId, CourseId, QuestionId, ReviewId};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::parse_id;
use crate::auth::{RequireAdmin, RequireAuth};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBody {
    pub question: String,
    pub content_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerBody {
    pub answer: String,
    pub content_id: String,
    pub question_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub review: String,
    pub rating: u8,
}

#[derive(Debug, Deserialize)]
pub struct ReviewReplyBody {
    pub comment: String,
}

/// `GET /api/v1/courses`
pub async fn list_courses(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let courses = state.courses.list_previews().await?;
    Ok(Json(json!({ "success": true, "courses": courses })))
}

/// `GET /api/v1/courses/{id}`
pub async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let course = state.courses.preview(parse_id::<CourseId>(&id)?).await?;
    Ok(Json(json!({ "success": true, "course": course })))
}

/// `GET /api/v1/courses/{id}/content`
pub async fn get_content(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let content = state
        .courses
        .content(&user, parse_id::<CourseId>(&id)?)
        .await?;
    Ok(Json(json!({ "success": true, "content": content })))
}

/// `PUT /api/v1/courses/{id}/questions`
pub async fn add_question(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<String>,
    body: Result<Json<QuestionBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let course = state
        .courses
        .add_question(
            &user,
            parse_id::<CourseId>(&id)?,
            parse_id::<ContentId>(&body.content_id)?,
            body.question,
        )
        .await?;
    Ok(Json(json!({ "success": true, "course": course })))
}

/// `PUT /api/v1/courses/{id}/answers`
pub async fn add_answer(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<String>,
    body: Result<Json<AnswerBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let course = state
        .courses
        .add_answer(
            &user,
            parse_id::<CourseId>(&id)?,
            parse_id::<ContentId>(&body.content_id)?,
            parse_id::<QuestionId>(&body.question_id)?,
            body.answer,
        )
        .await?;
    Ok(Json(json!({ "success": true, "course": course })))
}

/// `PUT /api/v1/courses/{id}/reviews`
///
/// Responds with the public preview, since reviews are public.
pub async fn add_review(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<String>,
    body: Result<Json<ReviewBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let course = state
        .courses
        .add_review(&user, parse_id::<CourseId>(&id)?, body.rating, body.review)
        .await?;
    Ok(Json(json!({ "success": true, "course": course.preview() })))
}

/// `PUT /api/v1/courses/{id}/reviews/{review_id}/replies`
pub async fn add_review_reply(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path((id, review_id)): Path<(String, String)>,
    body: Result<Json<ReviewReplyBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let course = state
        .courses
        .add_review_reply(
            &admin,
            parse_id::<CourseId>(&id)?,
            parse_id::<ReviewId>(&review_id)?,
            body.comment,
        )
        .await?;
    Ok(Json(json!({ "success": true, "course": course })))
}

/// `GET /api/v1/admin/courses`
pub async fn admin_list_courses(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Value>, ApiError> {
    let courses = state.courses.list_all().await?;
    Ok(Json(json!({ "success": true, "courses": courses })))
}

/// `POST /api/v1/admin/courses`
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_): RequireAdmin,
    body: Result<Json<CourseInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(input) = body?;
    let course = state.courses.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "course": course })),
    ))
}

/// `PUT /api/v1/admin/courses/{id}`
pub async fn edit_course(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<String>,
    body: Result<Json<CourseUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(update) = body?;
    let course = state
        .courses
        .edit(parse_id::<CourseId>(&id)?, update)
        .await?;
    Ok(Json(json!({ "success": true, "course": course })))
}

/// `DELETE /api/v1/admin/courses/{id}`
pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.courses.delete(parse_id::<CourseId>(&id)?).await?;
    Ok(Json(
        json!({ "success": true, "message": "Course deleted successfully" }),
    ))
}

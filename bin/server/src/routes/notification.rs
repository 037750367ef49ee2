//! Admin notification feed routes.

use axum::{
    Json,
    extract::{Path, State},
};
use coursehub_core::NotificationId;
use serde_json::{Value, json};
use std::sync::Arc;

use super::parse_id;
use crate::auth::RequireAdmin;
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/v1/admin/notifications`
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Value>, ApiError> {
    let notifications = state.notifications.list().await?;
    Ok(Json(json!({ "success": true, "notifications": notifications })))
}

/// `PUT /api/v1/admin/notifications/{id}`
///
/// Marks one notification read and responds with the whole feed.
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .notifications
        .mark_read(parse_id::<NotificationId>(&id)?)
        .await?
        .ok_or_else(|| ApiError::NotFound("Notification not found".to_string()))?;

    let notifications = state.notifications.list().await?;
    Ok(Json(json!({ "success": true, "notifications": notifications })))
}

//! Purchase routes.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use coursehub_catalog::PurchaseRequest;
use coursehub_core::CourseId;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use super::parse_id;
use crate::auth::{RequireAdmin, RequireAuth};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PaymentInfo {
    pub id: String,
}

/// Body of `POST /api/v1/orders`.
#[derive(Debug, Deserialize)]
pub struct OrderBody {
    #[serde(rename = "courseId")]
    pub course_id: String,
    #[serde(default)]
    pub payment_info: Option<PaymentInfo>,
}

impl OrderBody {
    fn into_request(self) -> Result<PurchaseRequest, ApiError> {
        Ok(PurchaseRequest {
            course_id: parse_id::<CourseId>(&self.course_id)?,
            payment_intent_id: self
                .payment_info
                .map(|info| info.id)
                .filter(|id| !id.is_empty()),
        })
    }
}

/// `POST /api/v1/orders`
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    body: Result<Json<OrderBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body?;
    let order = state
        .purchases
        .complete(user.user_id(), body.into_request()?)
        .await?;
    info!(order_id = %order.id, user_id = %order.user_id, "order created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "order": order })),
    ))
}

/// `GET /api/v1/admin/orders`
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Value>, ApiError> {
    let orders = state.orders.list().await?;
    Ok(Json(json!({ "success": true, "orders": orders })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_intent_id_is_treated_as_absent() {
        let body: OrderBody = serde_json::from_value(json!({
            "courseId": CourseId::new().to_string(),
            "payment_info": { "id": "" },
        }))
        .expect("deserialize");
        assert!(body.into_request().expect("valid").payment_intent_id.is_none());
    }

    #[test]
    fn malformed_course_id_is_validation() {
        let body = OrderBody {
            course_id: "nope".to_string(),
            payment_info: None,
        };
        assert!(matches!(body.into_request(), Err(ApiError::Validation(_))));
    }
}

//! Payment-intent routes.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use coursehub_catalog::NewPaymentIntent;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::RequireAuth;
use crate::config::PaymentConfig;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    /// Amount in whole currency units.
    pub amount: i64,
}

fn new_intent(amount: i64, config: &PaymentConfig) -> Result<NewPaymentIntent, ApiError> {
    if amount <= 0 {
        return Err(ApiError::Validation("amount must be positive".to_string()));
    }
    let minor = amount
        .checked_mul(config.minor_unit_factor)
        .ok_or_else(|| ApiError::Validation("amount is too large".to_string()))?;
    Ok(NewPaymentIntent {
        amount: minor,
        currency: config.currency.clone(),
        metadata: BTreeMap::from([("company".to_string(), config.company.clone())]),
    })
}

/// `GET /api/v1/payment/publishable-key`
pub async fn publishable_key(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "publishableKey": state.payments.publishable_key() }))
}

/// `POST /api/v1/payment`
pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    RequireAuth(_): RequireAuth,
    body: Result<Json<PaymentBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body?;
    let intent = state
        .payments
        .create_intent(&new_intent(body.amount, &state.payment)?)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "client_secret": intent.client_secret })),
    ))
}

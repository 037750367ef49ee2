//! Stripe payment-intent client.

use crate::config::PaymentConfig;
use async_trait::async_trait;
use coursehub_catalog::{
    NewPaymentIntent, PaymentError, PaymentIntent, PaymentProcessor, PaymentStatus,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

/// Payment intent as returned by the Stripe API.
#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    status: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    client_secret: Option<String>,
}

impl From<StripeIntent> for PaymentIntent {
    fn from(intent: StripeIntent) -> Self {
        Self {
            id: intent.id,
            status: PaymentStatus::parse(&intent.status),
            amount: intent.amount,
            currency: intent.currency,
            client_secret: intent.client_secret,
        }
    }
}

/// Stripe error envelope: `{"error": {"message": "..."}}`.
#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Calls the Stripe REST API with the configured secret key.
pub struct StripeClient {
    http: Client,
    secret_key: String,
    publishable_key: String,
    api_base: String,
}

impl StripeClient {
    /// Creates a client from payment configuration.
    #[must_use]
    pub fn new(http: Client, config: &PaymentConfig) -> Self {
        Self {
            http,
            secret_key: config.secret_key.clone(),
            publishable_key: config.publishable_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn read_intent(
        response: reqwest::Response,
        intent_id: Option<&str>,
    ) -> Result<PaymentIntent, PaymentError> {
        let status = response.status();
        if status.is_success() {
            let intent: StripeIntent =
                response
                    .json()
                    .await
                    .map_err(|e| PaymentError::Unavailable {
                        details: format!("invalid response body: {e}"),
                    })?;
            return Ok(intent.into());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body, intent_id))
    }
}

/// Encodes a new intent as Stripe form fields.
fn form_fields(intent: &NewPaymentIntent) -> Vec<(String, String)> {
    let mut fields = vec![
        ("amount".to_string(), intent.amount.to_string()),
        ("currency".to_string(), intent.currency.clone()),
        (
            "automatic_payment_methods[enabled]".to_string(),
            "true".to_string(),
        ),
    ];
    fields.extend(
        intent
            .metadata
            .iter()
            .map(|(k, v)| (format!("metadata[{k}]"), v.clone())),
    );
    fields
}

/// Maps a non-success response to a payment error.
fn classify_failure(status: StatusCode, body: &str, intent_id: Option<&str>) -> PaymentError {
    let message = serde_json::from_str::<StripeErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| body.to_string());

    match (status, intent_id) {
        (StatusCode::NOT_FOUND, Some(id)) => PaymentError::IntentNotFound {
            intent_id: id.to_string(),
        },
        (s, _) if s.is_client_error() && s != StatusCode::UNAUTHORIZED => {
            PaymentError::Rejected { details: message }
        }
        (s, _) => PaymentError::Unavailable {
            details: format!("{s}: {message}"),
        },
    }
}

fn transport_error(e: reqwest::Error) -> PaymentError {
    PaymentError::Unavailable {
        details: e.to_string(),
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    #[instrument(skip(self, intent), fields(amount = intent.amount, currency = %intent.currency))]
    async fn create_intent(&self, intent: &NewPaymentIntent) -> Result<PaymentIntent, PaymentError> {
        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form_fields(intent))
            .send()
            .await
            .map_err(transport_error)?;

        let created = Self::read_intent(response, None).await?;
        debug!(intent_id = %created.id, "payment intent created");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        let response = self
            .http
            .get(format!("{}/v1/payment_intents/{intent_id}", self.api_base))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_intent(response, Some(intent_id)).await
    }

    fn publishable_key(&self) -> &str {
        &self.publishable_key
    }
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn form_fields_include_metadata_and_automatic_methods() {
        let intent = NewPaymentIntent {
            amount: 10_000_000,
            currency: "vnd".to_string(),
            metadata: BTreeMap::from([("company".to_string(), "MindX".to_string())]),
        };
        let fields = form_fields(&intent);

        assert!(fields.contains(&("amount".to_string(), "10000000".to_string())));
        assert!(fields.contains(&(
            "automatic_payment_methods[enabled]".to_string(),
            "true".to_string()
        )));
        assert!(fields.contains(&("metadata[company]".to_string(), "MindX".to_string())));
    }

    #[test]
    fn unknown_intent_is_not_found() {
        let body = r#"{"error":{"message":"No such payment_intent: 'pi_x'"}}"#;
        assert_eq!(
            classify_failure(StatusCode::NOT_FOUND, body, Some("pi_x")),
            PaymentError::IntentNotFound {
                intent_id: "pi_x".to_string()
            }
        );
    }

    #[test]
    fn client_errors_are_rejections_with_stripe_message() {
        let body = r#"{"error":{"message":"Amount must be at least 50 cents"}}"#;
        assert_eq!(
            classify_failure(StatusCode::BAD_REQUEST, body, None),
            PaymentError::Rejected {
                details: "Amount must be at least 50 cents".to_string()
            }
        );
    }

    #[test]
    fn bad_credentials_and_server_errors_are_outages() {
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, "{}", None),
            PaymentError::Unavailable { .. }
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "upstream", Some("pi_1")),
            PaymentError::Unavailable { details } if details.contains("upstream")
        ));
    }

    #[test]
    fn stripe_intent_maps_status() {
        let intent: StripeIntent = serde_json::from_str(
            r#"{"id":"pi_1","status":"succeeded","amount":100,"currency":"vnd","object":"payment_intent"}"#,
        )
        .expect("deserialize");
        let intent = PaymentIntent::from(intent);
        assert!(intent.status.is_succeeded());
        assert!(intent.client_secret.is_none());
    }
}

//! Payment processor port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a payment intent.
///
/// Only `Succeeded` entitles a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    /// A status this build does not know about.
    #[serde(untagged)]
    Other(String),
}

impl PaymentStatus {
    /// Parses a processor status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "processing" => Self::Processing,
            "requires_capture" => Self::RequiresCapture,
            "canceled" => Self::Canceled,
            "succeeded" => Self::Succeeded,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the processor's status string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
            Self::Other(s) => s,
        }
    }

    /// Returns true if the payment has settled.
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment intent as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: PaymentStatus,
    /// Amount in the currency's minor unit.
    pub amount: i64,
    pub currency: String,
    /// Handed to the browser to confirm the payment.
    pub client_secret: Option<String>,
}

/// Parameters for a new payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentIntent {
    /// Amount in the currency's minor unit.
    pub amount: i64,
    pub currency: String,
    pub metadata: BTreeMap<String, String>,
}

/// Errors from the payment processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// The processor could not be reached or returned a server error.
    Unavailable { details: String },
    /// The processor rejected the request.
    Rejected { details: String },
    /// No intent with this id.
    IntentNotFound { intent_id: String },
}

impl fmt::Display for PaymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => write!(f, "payment processor unavailable: {details}"),
            Self::Rejected { details } => write!(f, "payment request rejected: {details}"),
            Self::IntentNotFound { intent_id } => write!(f, "payment intent {intent_id} not found"),
        }
    }
}

impl std::error::Error for PaymentError {}

/// Creates and inspects payment intents.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Creates a payment intent.
    async fn create_intent(&self, intent: &NewPaymentIntent) -> Result<PaymentIntent, PaymentError>;

    /// Retrieves a payment intent by id.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError>;

    /// Returns the key the browser uses to talk to the processor directly.
    fn publishable_key(&self) -> &str;
}

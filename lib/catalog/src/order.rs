//! Purchase records.

use chrono::{DateTime, Utc};
use coursehub_core::{CourseId, OrderId, UserId};
use serde::{Deserialize, Serialize};

/// An immutable record of a completed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub course_id: CourseId,
    /// Payment-intent id the buyer presented, if the purchase was paid.
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order stamped with the current time.
    #[must_use]
    pub fn new(user_id: UserId, course_id: CourseId, payment_intent_id: Option<String>) -> Self {
        Self {
            id: OrderId::new(),
            user_id,
            course_id,
            payment_intent_id,
            created_at: Utc::now(),
        }
    }
}

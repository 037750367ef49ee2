//! Purchase completion: turns a confirmed payment into course ownership.
//!
//! The critical path (grant, counter, order) runs in order and stops at the
//! first failure. Nothing before the grant mutates state; after the grant
//! there is no rollback, and a retry is stopped by the ownership check.
//! Email and the in-app notification are queued side effects and never fail
//! the purchase.

use crate::cache::CourseCache;
use crate::course::Course;
use crate::error::PurchaseError;
use crate::mail::MailMessage;
use crate::notification::Notification;
use crate::order::Order;
use crate::payment::{PaymentError, PaymentProcessor};
use crate::side_effect::{SideEffect, SideEffectQueue};
use crate::store::{GrantOutcome, OrderStore, UserStore};
use crate::templates::{ORDER_CONFIRMATION, format_vi_date, format_vnd};
use coursehub_core::{CourseId, UserId};
use coursehub_platform_access::{SessionStore, User};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Subject of the purchase confirmation email.
pub const ORDER_MAIL_SUBJECT: &str = "Xác nhận đơn hàng";
/// Title of the purchase notification.
pub const ORDER_NOTIFICATION_TITLE: &str = "Đơn hàng mới";

/// A request to complete a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub course_id: CourseId,
    /// Processor intent id. When absent, payment verification is skipped.
    #[serde(default)]
    pub payment_intent_id: Option<String>,
}

/// Completes purchases.
#[derive(Clone)]
pub struct PurchaseEngine {
    payments: Arc<dyn PaymentProcessor>,
    users: Arc<dyn UserStore>,
    courses: CourseCache,
    orders: Arc<dyn OrderStore>,
    sessions: SessionStore,
    side_effects: Arc<dyn SideEffectQueue>,
}

impl PurchaseEngine {
    #[must_use]
    pub fn new(
        payments: Arc<dyn PaymentProcessor>,
        users: Arc<dyn UserStore>,
        courses: CourseCache,
        orders: Arc<dyn OrderStore>,
        sessions: SessionStore,
        side_effects: Arc<dyn SideEffectQueue>,
    ) -> Self {
        Self {
            payments,
            users,
            courses,
            orders,
            sessions,
            side_effects,
        }
    }

    /// Completes a purchase of `request.course_id` by `buyer`.
    ///
    /// # Errors
    ///
    /// - `PaymentNotConfirmed` if the intent is unknown or has not succeeded
    /// - `PaymentUnavailable` if the processor cannot be reached
    /// - `UserNotFound` if the buyer has no user record
    /// - `AlreadyOwned` if the buyer owns the course, including when a
    ///   concurrent purchase commits first
    /// - `CourseNotFound` if the course does not exist in the store, even when
    ///   a stale cache entry still holds it
    /// - `Store` if a critical-path write fails
    #[instrument(skip(self, request), fields(course_id = %request.course_id))]
    pub async fn complete(
        &self,
        buyer: UserId,
        request: PurchaseRequest,
    ) -> Result<Order, Report<PurchaseError>> {
        let course_id = request.course_id;

        if let Some(intent_id) = request.payment_intent_id.as_deref() {
            self.verify_payment(intent_id).await?;
        }

        let user = self
            .users
            .find_by_id(buyer)
            .await
            .map_err(PurchaseError::from)?
            .ok_or(PurchaseError::UserNotFound { user_id: buyer })?;
        if user.owns_course(course_id) {
            return Err(PurchaseError::AlreadyOwned { course_id }.into());
        }

        // The store, not the cache, decides whether the course still exists.
        let course = self
            .courses
            .store()
            .find_by_id(course_id)
            .await
            .map_err(PurchaseError::from)?
            .ok_or(PurchaseError::CourseNotFound { course_id })?;

        let user = match self
            .users
            .grant_course(buyer, course_id)
            .await
            .map_err(PurchaseError::from)?
        {
            GrantOutcome::Granted(user) => user,
            GrantOutcome::AlreadyOwned => {
                info!("concurrent purchase already granted the course");
                return Err(PurchaseError::AlreadyOwned { course_id }.into());
            }
            GrantOutcome::UserNotFound => {
                return Err(PurchaseError::UserNotFound { user_id: buyer }.into());
            }
        };
        if let Err(e) = self.sessions.put(&user).await {
            warn!(error = %e, "failed to refresh session after grant");
        }

        let Some(updated) = self
            .courses
            .store()
            .increment_purchased(course_id)
            .await
            .map_err(PurchaseError::from)?
        else {
            warn!("course deleted during purchase, no order recorded");
            return Err(PurchaseError::CourseNotFound { course_id }.into());
        };
        if let Err(e) = self.courses.write_through(&updated).await {
            warn!(error = %e, "failed to update cached course after purchase");
        }

        let order = Order::new(buyer, course_id, request.payment_intent_id);
        self.orders.insert(&order).await.map_err(PurchaseError::from)?;
        info!(order_id = %order.id, user_id = %buyer, "purchase completed");

        self.enqueue_confirmation(&user, &course, &order).await;
        Ok(order)
    }

    async fn verify_payment(&self, intent_id: &str) -> Result<(), PurchaseError> {
        let intent = self
            .payments
            .retrieve_intent(intent_id)
            .await
            .map_err(|e| match e {
                PaymentError::IntentNotFound { intent_id } => PurchaseError::PaymentNotConfirmed {
                    intent_id,
                    status: "not_found".to_string(),
                },
                PaymentError::Unavailable { details } | PaymentError::Rejected { details } => {
                    PurchaseError::PaymentUnavailable { details }
                }
            })?;
        if !intent.status.is_succeeded() {
            return Err(PurchaseError::PaymentNotConfirmed {
                intent_id: intent.id,
                status: intent.status.to_string(),
            });
        }
        Ok(())
    }

    async fn enqueue_confirmation(&self, user: &User, course: &Course, order: &Order) {
        let data: HashMap<String, serde_json::Value> = [
            ("user_name", serde_json::json!(user.name())),
            ("order_id", serde_json::json!(order.id.to_string())),
            ("course_name", serde_json::json!(course.name)),
            ("price", serde_json::json!(format_vnd(course.price))),
            ("date", serde_json::json!(format_vi_date(order.created_at))),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let effects = [
            SideEffect::SendMail(MailMessage {
                recipient: user.email().to_string(),
                subject: ORDER_MAIL_SUBJECT.to_string(),
                template: ORDER_CONFIRMATION.to_string(),
                data,
            }),
            SideEffect::Notify(Notification::new(
                user.id(),
                ORDER_NOTIFICATION_TITLE,
                format!("Bạn đã mua thành công khóa học \"{}\".", course.name),
            )),
        ];
        for effect in effects {
            let kind = effect.kind();
            if let Err(e) = self.side_effects.enqueue(effect).await {
                warn!(kind, error = %e, "failed to enqueue purchase side effect");
            }
        }
    }
}

impl std::fmt::Debug for PurchaseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurchaseEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::CourseInput;
    use crate::memory::{
        MemoryCourseStore, MemoryMailer, MemoryNotificationStore, MemoryOrderStore,
        MemoryPaymentProcessor, MemoryUserStore, RecordingQueue,
    };
    use crate::payment::PaymentStatus;
    use crate::side_effect::{ChannelQueue, RetryPolicy, SideEffectDispatcher};
    use crate::store::{CourseStore, NotificationStore};
    use coursehub_platform_access::{MemoryCache, Role};
    use std::time::Duration;

    struct Fixture {
        engine: PurchaseEngine,
        payments: Arc<MemoryPaymentProcessor>,
        users: Arc<MemoryUserStore>,
        courses: Arc<MemoryCourseStore>,
        orders: Arc<MemoryOrderStore>,
        notifications: Arc<MemoryNotificationStore>,
        mailer: Arc<MemoryMailer>,
        sessions: SessionStore,
        queue: ChannelQueue,
        buyer: User,
        course: Course,
    }

    async fn fixture() -> Fixture {
        let kv = Arc::new(MemoryCache::new());
        let payments = Arc::new(MemoryPaymentProcessor::new("pk_test"));
        let users = Arc::new(MemoryUserStore::new());
        let courses = Arc::new(MemoryCourseStore::new());
        let orders = Arc::new(MemoryOrderStore::new());
        let notifications = Arc::new(MemoryNotificationStore::new());
        let mailer = Arc::new(MemoryMailer::new());
        let sessions = SessionStore::new(kv.clone());
        let dispatcher = Arc::new(SideEffectDispatcher::new(
            mailer.clone(),
            notifications.clone(),
        ));
        let (queue, _worker) = ChannelQueue::spawn(
            dispatcher,
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
        );

        let buyer = User::new("Ann".to_string(), "ann@example.com".to_string(), Role::Learner);
        users.insert(&buyer).await.expect("insert user");
        sessions.put(&buyer).await.expect("session");

        let course = Course::create(CourseInput {
            name: "C1".to_string(),
            description: "First course".to_string(),
            price: 100_000,
            estimated_price: None,
            tags: String::new(),
            level: String::new(),
            demo_url: String::new(),
            benefits: Vec::new(),
            prerequisites: Vec::new(),
            content: Vec::new(),
        })
        .expect("valid course");
        courses.insert(&course).await.expect("insert course");

        let engine = PurchaseEngine::new(
            payments.clone(),
            users.clone(),
            CourseCache::new(kv, courses.clone()),
            orders.clone(),
            sessions.clone(),
            Arc::new(queue.clone()),
        );

        Fixture {
            engine,
            payments,
            users,
            courses,
            orders,
            notifications,
            mailer,
            sessions,
            queue,
            buyer,
            course,
        }
    }

    fn request(course_id: CourseId, intent: Option<String>) -> PurchaseRequest {
        PurchaseRequest {
            course_id,
            payment_intent_id: intent,
        }
    }

    #[tokio::test]
    async fn purchase_grants_course_and_records_order() {
        let f = fixture().await;
        let intent = f.payments.insert_intent(10_000_000, PaymentStatus::Succeeded);

        let order = f
            .engine
            .complete(f.buyer.id(), request(f.course.id, Some(intent.clone())))
            .await
            .expect("purchase");

        assert_eq!(order.user_id, f.buyer.id());
        assert_eq!(order.course_id, f.course.id);
        assert_eq!(order.payment_intent_id.as_deref(), Some(intent.as_str()));
        assert_eq!(f.orders.list().await.expect("orders"), vec![order]);

        let course = f
            .courses
            .find_by_id(f.course.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(course.purchased, 1);

        let user = f
            .users
            .find_by_id(f.buyer.id())
            .await
            .expect("find")
            .expect("exists");
        assert!(user.owns_course(f.course.id));

        let session = f
            .sessions
            .get(f.buyer.id())
            .await
            .expect("session read")
            .expect("session exists");
        assert!(session.owns_course(f.course.id));

        f.queue.drained().await;
        let notifications = f.notifications.list().await.expect("list");
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "Đơn hàng mới");
        assert_eq!(notifications[0].user_id, f.buyer.id());
        assert_eq!(
            notifications[0].message,
            "Bạn đã mua thành công khóa học \"C1\"."
        );

        let sent = f.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "ann@example.com");
        assert_eq!(sent[0].subject, "Xác nhận đơn hàng");
        assert!(sent[0].html.contains("100.000 ₫"));
    }

    #[tokio::test]
    async fn second_purchase_is_rejected_without_mutation() {
        let f = fixture().await;
        f.engine
            .complete(f.buyer.id(), request(f.course.id, None))
            .await
            .expect("first purchase");

        let err = f
            .engine
            .complete(f.buyer.id(), request(f.course.id, None))
            .await
            .expect_err("second purchase");
        assert_eq!(
            err.current_context(),
            &PurchaseError::AlreadyOwned {
                course_id: f.course.id
            }
        );

        assert_eq!(f.orders.list().await.expect("orders").len(), 1);
        let course = f
            .courses
            .find_by_id(f.course.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(course.purchased, 1);
    }

    #[tokio::test]
    async fn concurrent_purchases_grant_once() {
        let f = fixture().await;
        let (a, b) = tokio::join!(
            f.engine.complete(f.buyer.id(), request(f.course.id, None)),
            f.engine.complete(f.buyer.id(), request(f.course.id, None)),
        );

        assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
        let loser = a.err().or(b.err()).expect("one purchase fails");
        assert!(matches!(
            loser.current_context(),
            PurchaseError::AlreadyOwned { .. }
        ));
        assert_eq!(f.orders.list().await.expect("orders").len(), 1);
    }

    #[tokio::test]
    async fn unconfirmed_payment_mutates_nothing() {
        let f = fixture().await;
        let intent = f.payments.insert_intent(10_000_000, PaymentStatus::Processing);

        let err = f
            .engine
            .complete(f.buyer.id(), request(f.course.id, Some(intent.clone())))
            .await
            .expect_err("not confirmed");
        assert_eq!(
            err.current_context(),
            &PurchaseError::PaymentNotConfirmed {
                intent_id: intent,
                status: "processing".to_string(),
            }
        );

        let user = f
            .users
            .find_by_id(f.buyer.id())
            .await
            .expect("find")
            .expect("exists");
        assert!(user.courses().is_empty());
        assert!(f.orders.list().await.expect("orders").is_empty());
    }

    #[tokio::test]
    async fn unknown_intent_is_not_confirmed() {
        let f = fixture().await;
        let err = f
            .engine
            .complete(
                f.buyer.id(),
                request(f.course.id, Some("pi_missing".to_string())),
            )
            .await
            .expect_err("unknown intent");
        assert!(matches!(
            err.current_context(),
            PurchaseError::PaymentNotConfirmed { .. }
        ));
    }

    #[tokio::test]
    async fn processor_outage_is_unavailable() {
        let f = fixture().await;
        let intent = f.payments.insert_intent(10_000_000, PaymentStatus::Succeeded);
        f.payments.set_offline(true);

        let err = f
            .engine
            .complete(f.buyer.id(), request(f.course.id, Some(intent)))
            .await
            .expect_err("offline");
        assert!(matches!(
            err.current_context(),
            PurchaseError::PaymentUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_course_is_not_found() {
        let f = fixture().await;
        let missing = CourseId::new();
        let err = f
            .engine
            .complete(f.buyer.id(), request(missing, None))
            .await
            .expect_err("missing course");
        assert_eq!(
            err.current_context(),
            &PurchaseError::CourseNotFound { course_id: missing }
        );
        assert!(f.orders.list().await.expect("orders").is_empty());
    }

    #[tokio::test]
    async fn stale_cached_course_is_not_sold() {
        let f = fixture().await;
        let kv = Arc::new(MemoryCache::new());
        let cache = CourseCache::new(kv, f.courses.clone());
        let engine = PurchaseEngine::new(
            f.payments.clone(),
            f.users.clone(),
            cache.clone(),
            f.orders.clone(),
            f.sessions.clone(),
            Arc::new(RecordingQueue::new()),
        );

        cache.get(f.course.id).await.expect("populate").expect("exists");
        assert!(f.courses.delete(f.course.id).await.expect("delete"));

        let err = engine
            .complete(f.buyer.id(), request(f.course.id, None))
            .await
            .expect_err("deleted course");
        assert_eq!(
            err.current_context(),
            &PurchaseError::CourseNotFound {
                course_id: f.course.id
            }
        );
        assert!(f.orders.list().await.expect("orders").is_empty());
        let user = f
            .users
            .find_by_id(f.buyer.id())
            .await
            .expect("find")
            .expect("exists");
        assert!(!user.owns_course(f.course.id));
    }

    #[tokio::test]
    async fn unknown_buyer_is_rejected() {
        let f = fixture().await;
        let err = f
            .engine
            .complete(UserId::new(), request(f.course.id, None))
            .await
            .expect_err("no user");
        assert!(matches!(
            err.current_context(),
            PurchaseError::UserNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn rejected_enqueue_does_not_fail_purchase() {
        let f = fixture().await;
        let queue = Arc::new(RecordingQueue::new());
        queue.set_rejecting(true);
        let engine = PurchaseEngine::new(
            f.payments.clone(),
            f.users.clone(),
            CourseCache::new(Arc::new(MemoryCache::new()), f.courses.clone()),
            f.orders.clone(),
            f.sessions.clone(),
            queue.clone(),
        );

        engine
            .complete(f.buyer.id(), request(f.course.id, None))
            .await
            .expect("purchase");
        assert!(queue.effects().is_empty());
        assert_eq!(f.orders.list().await.expect("orders").len(), 1);
    }

    #[tokio::test]
    async fn queues_mail_then_notification() {
        let f = fixture().await;
        let queue = Arc::new(RecordingQueue::new());
        let engine = PurchaseEngine::new(
            f.payments.clone(),
            f.users.clone(),
            CourseCache::new(Arc::new(MemoryCache::new()), f.courses.clone()),
            f.orders.clone(),
            f.sessions.clone(),
            queue.clone(),
        );

        engine
            .complete(f.buyer.id(), request(f.course.id, None))
            .await
            .expect("purchase");

        let kinds: Vec<_> = queue.effects().iter().map(SideEffect::kind).collect();
        assert_eq!(kinds, vec!["send_mail", "notify"]);
    }
}

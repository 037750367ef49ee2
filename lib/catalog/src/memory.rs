//! In-process implementations of the catalog ports.
//!
//! Used by tests across the workspace and for running the server without
//! external services. Every store keeps its state behind a single mutex, so
//! each operation (including the conditional grant) is one critical section.

use crate::course::Course;
use crate::error::StoreError;
use crate::mail::{MailError, MailMessage, Mailer, RenderedMail};
use crate::notification::Notification;
use crate::order::Order;
use crate::payment::{
    NewPaymentIntent, PaymentError, PaymentIntent, PaymentProcessor, PaymentStatus,
};
use crate::side_effect::{SideEffect, SideEffectError, SideEffectQueue};
use crate::store::{CourseStore, GrantOutcome, NotificationStore, OrderStore, UserStore};
use crate::templates::TemplateRenderer;
use crate::video::{VideoError, VideoPlayback, VideoProvider};
use async_trait::async_trait;
use coursehub_core::{CourseId, NotificationId, UserId};
use coursehub_platform_access::User;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use ulid::Ulid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`UserStore`].
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<UserId, User>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(lock(&self.users).get(&id).cloned())
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        lock(&self.users).insert(user.id(), user.clone());
        Ok(())
    }

    async fn grant_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<GrantOutcome, StoreError> {
        let mut users = lock(&self.users);
        let Some(user) = users.get_mut(&user_id) else {
            return Ok(GrantOutcome::UserNotFound);
        };
        if user.grant_course(course_id) {
            Ok(GrantOutcome::Granted(user.clone()))
        } else {
            Ok(GrantOutcome::AlreadyOwned)
        }
    }
}

/// In-memory [`CourseStore`] that counts reads.
#[derive(Default)]
pub struct MemoryCourseStore {
    courses: Mutex<HashMap<CourseId, Course>>,
    reads: AtomicUsize,
}

impl MemoryCourseStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find_by_id` calls served so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CourseStore for MemoryCourseStore {
    async fn find_by_id(&self, id: CourseId) -> Result<Option<Course>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.courses).get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Course>, StoreError> {
        let mut courses: Vec<Course> = lock(&self.courses).values().cloned().collect();
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(courses)
    }

    async fn insert(&self, course: &Course) -> Result<(), StoreError> {
        lock(&self.courses).insert(course.id, course.clone());
        Ok(())
    }

    async fn update(&self, course: &Course) -> Result<Course, StoreError> {
        let mut courses = lock(&self.courses);
        let Some(existing) = courses.get_mut(&course.id) else {
            return Err(StoreError::Missing {
                entity: "course",
                id: course.id.to_string(),
            });
        };
        let purchased = existing.purchased;
        *existing = Course {
            purchased,
            ..course.clone()
        };
        Ok(existing.clone())
    }

    async fn delete(&self, id: CourseId) -> Result<bool, StoreError> {
        Ok(lock(&self.courses).remove(&id).is_some())
    }

    async fn increment_purchased(&self, id: CourseId) -> Result<Option<Course>, StoreError> {
        let mut courses = lock(&self.courses);
        Ok(courses.get_mut(&id).map(|course| {
            course.purchased += 1;
            course.clone()
        }))
    }
}

/// In-memory [`OrderStore`].
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<Vec<Order>>,
}

impl MemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        lock(&self.orders).push(order.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders = lock(&self.orders).clone();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}

/// In-memory [`NotificationStore`].
#[derive(Default)]
pub struct MemoryNotificationStore {
    notifications: Mutex<Vec<Notification>>,
}

impl MemoryNotificationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert(&self, notification: &Notification) -> Result<(), StoreError> {
        let mut notifications = lock(&self.notifications);
        if !notifications.iter().any(|n| n.id == notification.id) {
            notifications.push(notification.clone());
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Notification>, StoreError> {
        let mut notifications = lock(&self.notifications).clone();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn mark_read(&self, id: NotificationId) -> Result<Option<Notification>, StoreError> {
        let mut notifications = lock(&self.notifications);
        Ok(notifications.iter_mut().find(|n| n.id == id).map(|n| {
            n.mark_read();
            n.clone()
        }))
    }
}

/// In-memory [`PaymentProcessor`].
///
/// Created intents start in `requires_payment_method`; tests move them along
/// with [`MemoryPaymentProcessor::set_status`].
pub struct MemoryPaymentProcessor {
    intents: Mutex<HashMap<String, PaymentIntent>>,
    publishable_key: String,
    offline: AtomicBool,
}

impl MemoryPaymentProcessor {
    #[must_use]
    pub fn new(publishable_key: impl Into<String>) -> Self {
        Self {
            intents: Mutex::new(HashMap::new()),
            publishable_key: publishable_key.into(),
            offline: AtomicBool::new(false),
        }
    }

    /// Registers an intent with the given status and returns its id.
    pub fn insert_intent(&self, amount: i64, status: PaymentStatus) -> String {
        let id = format!("pi_{}", Ulid::new());
        let intent = PaymentIntent {
            id: id.clone(),
            status,
            amount,
            currency: "vnd".to_string(),
            client_secret: Some(format!("{id}_secret")),
        };
        lock(&self.intents).insert(id.clone(), intent);
        id
    }

    /// Changes the status of an existing intent.
    pub fn set_status(&self, intent_id: &str, status: PaymentStatus) {
        if let Some(intent) = lock(&self.intents).get_mut(intent_id) {
            intent.status = status;
        }
    }

    /// Makes every call fail with `Unavailable` while `offline` is true.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), PaymentError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PaymentError::Unavailable {
                details: "payment processor is offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProcessor for MemoryPaymentProcessor {
    async fn create_intent(&self, intent: &NewPaymentIntent) -> Result<PaymentIntent, PaymentError> {
        self.check_online()?;
        if intent.amount <= 0 {
            return Err(PaymentError::Rejected {
                details: "amount must be positive".to_string(),
            });
        }
        let id = self.insert_intent(intent.amount, PaymentStatus::RequiresPaymentMethod);
        let mut intents = lock(&self.intents);
        let created = intents.get_mut(&id).ok_or_else(|| PaymentError::IntentNotFound {
            intent_id: id.clone(),
        })?;
        created.currency.clone_from(&intent.currency);
        Ok(created.clone())
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        self.check_online()?;
        lock(&self.intents)
            .get(intent_id)
            .cloned()
            .ok_or_else(|| PaymentError::IntentNotFound {
                intent_id: intent_id.to_string(),
            })
    }

    fn publishable_key(&self) -> &str {
        &self.publishable_key
    }
}

/// [`Mailer`] that renders and records messages instead of sending them.
pub struct MemoryMailer {
    renderer: TemplateRenderer,
    sent: Mutex<Vec<RenderedMail>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
}

impl MemoryMailer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            renderer: TemplateRenderer::default(),
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
        }
    }

    /// Makes the next `count` sends fail with a transport error.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Messages successfully sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<RenderedMail> {
        lock(&self.sent).clone()
    }

    /// Total send attempts, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for MemoryMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(MailError::Transport {
                details: "simulated transport failure".to_string(),
            });
        }
        let rendered = message.render(&self.renderer)?;
        lock(&self.sent).push(rendered);
        Ok(())
    }
}

/// [`SideEffectQueue`] that records effects without performing them.
#[derive(Default)]
pub struct RecordingQueue {
    effects: Mutex<Vec<SideEffect>>,
    rejecting: AtomicBool,
}

impl RecordingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every enqueue fail while `rejecting` is true.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Effects accepted so far, in order.
    #[must_use]
    pub fn effects(&self) -> Vec<SideEffect> {
        lock(&self.effects).clone()
    }
}

#[async_trait]
impl SideEffectQueue for RecordingQueue {
    async fn enqueue(&self, effect: SideEffect) -> Result<(), SideEffectError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(SideEffectError::EnqueueFailed {
                details: "queue is rejecting".to_string(),
            });
        }
        lock(&self.effects).push(effect);
        Ok(())
    }
}

/// [`VideoProvider`] that knows a fixed set of video ids.
#[derive(Default)]
pub struct MemoryVideoProvider {
    videos: Mutex<Vec<String>>,
    issued: AtomicUsize,
}

impl MemoryVideoProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `video_id` known to the provider.
    pub fn add_video(&self, video_id: impl Into<String>) {
        lock(&self.videos).push(video_id.into());
    }
}

#[async_trait]
impl VideoProvider for MemoryVideoProvider {
    async fn playback_otp(&self, video_id: &str) -> Result<VideoPlayback, VideoError> {
        if !lock(&self.videos).iter().any(|v| v == video_id) {
            return Err(VideoError::UnknownVideo {
                video_id: video_id.to_string(),
            });
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(VideoPlayback {
            otp: format!("otp_{video_id}_{n}"),
            playback_info: format!("info_{video_id}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursehub_platform_access::Role;
    use std::sync::Arc;

    #[tokio::test]
    async fn concurrent_grants_succeed_once() {
        let store = Arc::new(MemoryUserStore::new());
        let user = User::new("Ann".to_string(), "ann@example.com".to_string(), Role::Learner);
        store.insert(&user).await.expect("insert");
        let course_id = CourseId::new();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let user_id = user.id();
            handles.push(tokio::spawn(async move {
                store.grant_course(user_id, course_id).await
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if let GrantOutcome::Granted(_) = handle.await.expect("join").expect("grant") {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);

        let stored = store.find_by_id(user.id()).await.expect("find").expect("exists");
        assert_eq!(stored.courses(), &[course_id]);
    }

    #[tokio::test]
    async fn grant_for_unknown_user() {
        let store = MemoryUserStore::new();
        assert_eq!(
            store
                .grant_course(UserId::new(), CourseId::new())
                .await
                .expect("grant"),
            GrantOutcome::UserNotFound
        );
    }

    #[tokio::test]
    async fn payment_intent_lifecycle() {
        let payments = MemoryPaymentProcessor::new("pk_test");
        let intent = payments
            .create_intent(&NewPaymentIntent {
                amount: 10_000_000,
                currency: "vnd".to_string(),
                metadata: Default::default(),
            })
            .await
            .expect("create");
        assert_eq!(intent.status, PaymentStatus::RequiresPaymentMethod);
        assert!(intent.client_secret.is_some());

        payments.set_status(&intent.id, PaymentStatus::Succeeded);
        let retrieved = payments.retrieve_intent(&intent.id).await.expect("retrieve");
        assert!(retrieved.status.is_succeeded());
        assert_eq!(payments.publishable_key(), "pk_test");
    }

    #[tokio::test]
    async fn unknown_intent_is_not_found() {
        let payments = MemoryPaymentProcessor::new("pk_test");
        assert!(matches!(
            payments.retrieve_intent("pi_missing").await,
            Err(PaymentError::IntentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn mark_read_updates_status() {
        let store = MemoryNotificationStore::new();
        let notification = Notification::new(UserId::new(), "t", "m");
        store.insert(&notification).await.expect("insert");

        let updated = store
            .mark_read(notification.id)
            .await
            .expect("mark")
            .expect("exists");
        assert_eq!(updated.status, crate::notification::NotificationStatus::Read);
        assert!(store.mark_read(NotificationId::new()).await.expect("mark").is_none());
    }

    #[tokio::test]
    async fn course_update_keeps_stored_counter() {
        let store = MemoryCourseStore::new();
        let course = Course::create(crate::course::CourseInput {
            name: "Rust 101".to_string(),
            description: "Ownership".to_string(),
            price: 100_000,
            estimated_price: None,
            tags: String::new(),
            level: String::new(),
            demo_url: String::new(),
            benefits: Vec::new(),
            prerequisites: Vec::new(),
            content: Vec::new(),
        })
        .expect("valid");
        store.insert(&course).await.expect("insert");
        store
            .increment_purchased(course.id)
            .await
            .expect("increment")
            .expect("exists");

        let mut edited = course.clone();
        edited.price = 50_000;
        edited.purchased = 42;
        let committed = store.update(&edited).await.expect("update");

        assert_eq!(committed.price, 50_000);
        assert_eq!(committed.purchased, 1);
        let stored = store.find_by_id(course.id).await.expect("find").expect("exists");
        assert_eq!(stored, committed);
    }

    #[tokio::test]
    async fn video_provider_issues_otp_for_known_videos() {
        let provider = MemoryVideoProvider::new();
        provider.add_video("vid_1");

        let playback = provider.playback_otp("vid_1").await.expect("otp");
        assert!(playback.otp.starts_with("otp_vid_1"));
        assert_eq!(
            provider.playback_otp("vid_2").await,
            Err(VideoError::UnknownVideo {
                video_id: "vid_2".to_string()
            })
        );
    }
}

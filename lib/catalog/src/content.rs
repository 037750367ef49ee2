//! Course reads, admin course management, reviews, and Q&A.
//!
//! Reads go through the [`CourseCache`]. Mutations load the authoritative
//! document from the store, apply the change, and commit it back with a
//! write-through. Notifications and emails produced by a mutation are queued
//! once the store write has committed.

use crate::cache::CourseCache;
use crate::course::{
    Author, ContentSection, Course, CourseInput, CoursePreview, CourseUpdate,
};
use crate::error::CatalogError;
use crate::mail::MailMessage;
use crate::notification::Notification;
use crate::side_effect::{SideEffect, SideEffectQueue};
use crate::templates::QUESTION_REPLY;
use coursehub_core::{ContentId, CourseId, QuestionId, ReviewId};
use coursehub_platform_access::AuthenticatedUser;
use rootcause::Report;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Subject of the email sent to an asker when someone else answers.
pub const QUESTION_REPLY_SUBJECT: &str = "Trả lời câu hỏi";

/// Course operations behind the HTTP routes.
#[derive(Clone)]
pub struct CourseService {
    courses: CourseCache,
    side_effects: Arc<dyn SideEffectQueue>,
}

impl CourseService {
    #[must_use]
    pub fn new(courses: CourseCache, side_effects: Arc<dyn SideEffectQueue>) -> Self {
        Self {
            courses,
            side_effects,
        }
    }

    /// Public previews of every course, newest first.
    pub async fn list_previews(&self) -> Result<Vec<CoursePreview>, Report<CatalogError>> {
        let courses = self.courses.store().list().await.map_err(CatalogError::from)?;
        Ok(courses.iter().map(Course::preview).collect())
    }

    /// Full documents of every course, newest first. Admin only.
    pub async fn list_all(&self) -> Result<Vec<Course>, Report<CatalogError>> {
        Ok(self
            .courses
            .store()
            .list()
            .await
            .map_err(CatalogError::from)?)
    }

    /// The public preview of one course, served from the cache when possible.
    pub async fn preview(&self, course_id: CourseId) -> Result<CoursePreview, Report<CatalogError>> {
        let course = self
            .courses
            .get(course_id)
            .await?
            .ok_or(CatalogError::CourseNotFound { course_id })?;
        Ok(course.preview())
    }

    /// Content sections of a course the caller owns.
    ///
    /// Ownership is read from the caller's session snapshot. A caller who
    /// does not own the course gets `NotOwned`, which is reported the same
    /// way as a missing course.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id()))]
    pub async fn content(
        &self,
        caller: &AuthenticatedUser,
        course_id: CourseId,
    ) -> Result<Vec<ContentSection>, Report<CatalogError>> {
        if !caller.owns_course(course_id) {
            return Err(CatalogError::NotOwned {
                user_id: caller.user_id(),
                course_id,
            }
            .into());
        }
        let course = self
            .courses
            .get(course_id)
            .await?
            .ok_or(CatalogError::CourseNotFound { course_id })?;
        Ok(course.content)
    }

    /// Creates a course.
    #[instrument(skip_all)]
    pub async fn create(&self, input: CourseInput) -> Result<Course, Report<CatalogError>> {
        let course = Course::create(input)?;
        self.courses
            .store()
            .insert(&course)
            .await
            .map_err(CatalogError::from)?;
        info!(course_id = %course.id, "course created");
        Ok(course)
    }

    /// Edits a course and writes the result through to the cache.
    #[instrument(skip(self, update))]
    pub async fn edit(
        &self,
        course_id: CourseId,
        update: CourseUpdate,
    ) -> Result<Course, Report<CatalogError>> {
        let mut course = self.load(course_id).await?;
        course.apply(update)?;
        Ok(self.courses.commit(&course).await?)
    }

    /// Deletes a course and its cache entry.
    #[instrument(skip(self))]
    pub async fn delete(&self, course_id: CourseId) -> Result<(), Report<CatalogError>> {
        let deleted = self
            .courses
            .store()
            .delete(course_id)
            .await
            .map_err(CatalogError::from)?;
        if !deleted {
            return Err(CatalogError::CourseNotFound { course_id }.into());
        }
        self.courses.evict(course_id).await?;
        info!("course deleted");
        Ok(())
    }

    /// Adds a review by an owner of the course and recomputes the rating.
    #[instrument(skip(self, caller, comment), fields(user_id = %caller.user_id()))]
    pub async fn add_review(
        &self,
        caller: &AuthenticatedUser,
        course_id: CourseId,
        rating: u8,
        comment: String,
    ) -> Result<Course, Report<CatalogError>> {
        if !caller.owns_course(course_id) {
            return Err(CatalogError::NotOwned {
                user_id: caller.user_id(),
                course_id,
            }
            .into());
        }
        let mut course = self.load(course_id).await?;
        course.add_review(Author::from(caller.user()), rating, comment)?;

        let notification = Notification::new(
            caller.user_id(),
            "Đánh giá mới",
            format!("{} đã đánh giá khóa học {}", caller.user().name(), course.name),
        );
        Ok(self
            .commit_then(&course, vec![SideEffect::Notify(notification)])
            .await?)
    }

    /// Adds an admin reply to a review.
    #[instrument(skip(self, caller, text), fields(user_id = %caller.user_id()))]
    pub async fn add_review_reply(
        &self,
        caller: &AuthenticatedUser,
        course_id: CourseId,
        review_id: ReviewId,
        text: String,
    ) -> Result<Course, Report<CatalogError>> {
        let mut course = self.load(course_id).await?;
        course.add_review_reply(review_id, Author::from(caller.user()), text)?;
        Ok(self.courses.commit(&course).await?)
    }

    /// Adds a question to a content section.
    #[instrument(skip(self, caller, text), fields(user_id = %caller.user_id()))]
    pub async fn add_question(
        &self,
        caller: &AuthenticatedUser,
        course_id: CourseId,
        content_id: ContentId,
        text: String,
    ) -> Result<Course, Report<CatalogError>> {
        require_access(caller, course_id)?;
        let mut course = self.load(course_id).await?;
        course.add_question(content_id, Author::from(caller.user()), text)?;

        let notification = Notification::new(
            caller.user_id(),
            "Câu hỏi mới",
            format!("Có câu hỏi mới trong khóa học {}", course.name),
        );
        Ok(self
            .commit_then(&course, vec![SideEffect::Notify(notification)])
            .await?)
    }

    /// Answers a question.
    ///
    /// When the asker answers their own question they get a notification;
    /// otherwise the asker is emailed.
    #[instrument(skip(self, caller, text), fields(user_id = %caller.user_id()))]
    pub async fn add_answer(
        &self,
        caller: &AuthenticatedUser,
        course_id: CourseId,
        content_id: ContentId,
        question_id: QuestionId,
        text: String,
    ) -> Result<Course, Report<CatalogError>> {
        require_access(caller, course_id)?;
        let mut course = self.load(course_id).await?;
        let receipt =
            course.add_answer(content_id, question_id, Author::from(caller.user()), text)?;

        let effect = if receipt.asker.id == caller.user_id() {
            SideEffect::Notify(Notification::new(
                caller.user_id(),
                "Trả lời câu hỏi mới",
                format!(
                    "Có trả lời mới cho câu hỏi của bạn trong khóa học {}",
                    receipt.section_title
                ),
            ))
        } else {
            SideEffect::SendMail(MailMessage {
                recipient: receipt.asker.email.clone(),
                subject: QUESTION_REPLY_SUBJECT.to_string(),
                template: QUESTION_REPLY.to_string(),
                data: [
                    ("name".to_string(), serde_json::json!(receipt.asker.name)),
                    ("title".to_string(), serde_json::json!(receipt.section_title)),
                ]
                .into_iter()
                .collect(),
            })
        };
        Ok(self.commit_then(&course, vec![effect]).await?)
    }

    async fn load(&self, course_id: CourseId) -> Result<Course, CatalogError> {
        self.courses
            .store()
            .find_by_id(course_id)
            .await?
            .ok_or(CatalogError::CourseNotFound { course_id })
    }

    /// Commits the course and queues `effects` once the store write is in,
    /// even if the cache write-through then fails.
    async fn commit_then(
        &self,
        course: &Course,
        effects: Vec<SideEffect>,
    ) -> Result<Course, CatalogError> {
        let committed = self.courses.commit(course).await;
        if matches!(committed, Ok(_) | Err(CatalogError::CacheWrite { .. })) {
            for effect in effects {
                let kind = effect.kind();
                if let Err(e) = self.side_effects.enqueue(effect).await {
                    warn!(kind, error = %e, "failed to enqueue course side effect");
                }
            }
        }
        committed
    }
}

impl std::fmt::Debug for CourseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourseService")
            .field("courses", &self.courses)
            .finish_non_exhaustive()
    }
}

/// Q&A is open to owners of the course and to admins.
fn require_access(caller: &AuthenticatedUser, course_id: CourseId) -> Result<(), CatalogError> {
    if caller.is_admin() || caller.owns_course(course_id) {
        Ok(())
    } else {
        Err(CatalogError::NotOwned {
            user_id: caller.user_id(),
            course_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::{Link, SectionInput};
    use crate::memory::{MemoryCourseStore, RecordingQueue};
    use crate::store::CourseStore;
    use coursehub_platform_access::{MemoryCache, Role, User};

    struct Fixture {
        service: CourseService,
        kv: Arc<MemoryCache>,
        store: Arc<MemoryCourseStore>,
        queue: Arc<RecordingQueue>,
        course: Course,
    }

    fn input() -> CourseInput {
        CourseInput {
            name: "Rust 101".to_string(),
            description: "Ownership and borrowing".to_string(),
            price: 100_000,
            estimated_price: None,
            tags: "rust".to_string(),
            level: "beginner".to_string(),
            demo_url: "https://video.example.com/demo".to_string(),
            benefits: vec!["Confidence".to_string()],
            prerequisites: Vec::new(),
            content: vec![SectionInput {
                id: None,
                title: "Intro".to_string(),
                description: "Welcome".to_string(),
                video_url: "https://video.example.com/1".to_string(),
                video_section: "Basics".to_string(),
                video_length: 10,
                links: vec![Link {
                    title: "book".to_string(),
                    url: "https://doc.rust-lang.org/book".to_string(),
                }],
                suggestion: String::new(),
            }],
        }
    }

    async fn fixture() -> Fixture {
        let kv = Arc::new(MemoryCache::new());
        let store = Arc::new(MemoryCourseStore::new());
        let queue = Arc::new(RecordingQueue::new());
        let service = CourseService::new(CourseCache::new(kv.clone(), store.clone()), queue.clone());
        let course = service.create(input()).await.expect("create");
        Fixture {
            service,
            kv,
            store,
            queue,
            course,
        }
    }

    fn learner(name: &str, owns: &[CourseId]) -> AuthenticatedUser {
        let mut user = User::new(
            name.to_string(),
            format!("{}@example.com", name.to_lowercase()),
            Role::Learner,
        );
        for id in owns {
            user.grant_course(*id);
        }
        AuthenticatedUser::new(user)
    }

    fn admin() -> AuthenticatedUser {
        AuthenticatedUser::new(User::new(
            "Root".to_string(),
            "root@example.com".to_string(),
            Role::Admin,
        ))
    }

    fn notifications(queue: &RecordingQueue) -> Vec<Notification> {
        queue
            .effects()
            .into_iter()
            .filter_map(|e| match e {
                SideEffect::Notify(n) => Some(n),
                SideEffect::SendMail(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn preview_is_cached_after_first_read() {
        let f = fixture().await;
        let first = f.service.preview(f.course.id).await.expect("preview");
        let second = f.service.preview(f.course.id).await.expect("preview");
        assert_eq!(first, second);
        assert_eq!(f.store.reads(), 1);
    }

    #[tokio::test]
    async fn preview_of_missing_course() {
        let f = fixture().await;
        let missing = CourseId::new();
        let err = f.service.preview(missing).await.expect_err("missing");
        assert_eq!(
            err.current_context(),
            &CatalogError::CourseNotFound { course_id: missing }
        );
    }

    #[tokio::test]
    async fn list_previews_strips_content() {
        let f = fixture().await;
        let previews = f.service.list_previews().await.expect("list");
        assert_eq!(previews.len(), 1);
        let json = serde_json::to_value(&previews[0]).expect("json");
        assert!(json.get("content").is_none());
        assert!(!json.to_string().contains("video.example.com/1"));
    }

    #[tokio::test]
    async fn content_requires_ownership() {
        let f = fixture().await;
        let stranger = learner("Bob", &[]);
        let err = f
            .service
            .content(&stranger, f.course.id)
            .await
            .expect_err("not owned");
        assert!(matches!(err.current_context(), CatalogError::NotOwned { .. }));

        let owner = learner("Ann", &[f.course.id]);
        let content = f.service.content(&owner, f.course.id).await.expect("owned");
        assert_eq!(content.len(), 1);
        assert_eq!(content[0].video_url, "https://video.example.com/1");
    }

    #[tokio::test]
    async fn reviews_average_and_notify() {
        let f = fixture().await;
        for (name, rating) in [("Ann", 5), ("Bob", 3), ("Cid", 4)] {
            let owner = learner(name, &[f.course.id]);
            f.service
                .add_review(&owner, f.course.id, rating, "ok".to_string())
                .await
                .expect("review");
        }

        let stored = f
            .store
            .find_by_id(f.course.id)
            .await
            .expect("find")
            .expect("exists");
        assert!((stored.rating - 4.0).abs() < f64::EPSILON);

        let notes = notifications(&f.queue);
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].title, "Đánh giá mới");
        assert_eq!(notes[0].message, "Ann đã đánh giá khóa học Rust 101");
    }

    #[tokio::test]
    async fn review_requires_ownership_and_valid_rating() {
        let f = fixture().await;
        let stranger = learner("Bob", &[]);
        let err = f
            .service
            .add_review(&stranger, f.course.id, 5, String::new())
            .await
            .expect_err("not owned");
        assert!(matches!(err.current_context(), CatalogError::NotOwned { .. }));

        let owner = learner("Ann", &[f.course.id]);
        let err = f
            .service
            .add_review(&owner, f.course.id, 6, String::new())
            .await
            .expect_err("out of range");
        assert!(matches!(err.current_context(), CatalogError::Invalid { .. }));
        assert!(f.queue.effects().is_empty());
    }

    #[tokio::test]
    async fn mutation_overwrites_cache_entry() {
        let f = fixture().await;
        f.service.preview(f.course.id).await.expect("warm cache");

        let update = CourseUpdate {
            name: Some("Rust 102".to_string()),
            ..CourseUpdate::default()
        };
        f.service.edit(f.course.id, update).await.expect("edit");

        let reads_before = f.store.reads();
        let preview = f.service.preview(f.course.id).await.expect("preview");
        assert_eq!(preview.name, "Rust 102");
        assert_eq!(f.store.reads(), reads_before);
    }

    #[tokio::test]
    async fn delete_evicts_cache_entry() {
        let f = fixture().await;
        f.service.preview(f.course.id).await.expect("warm cache");
        assert!(f.kv.contains(&CourseCache::key(f.course.id)));

        f.service.delete(f.course.id).await.expect("delete");
        assert!(!f.kv.contains(&CourseCache::key(f.course.id)));

        let err = f.service.delete(f.course.id).await.expect_err("gone");
        assert!(matches!(
            err.current_context(),
            CatalogError::CourseNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn question_notifies_and_answer_by_asker_notifies() {
        let f = fixture().await;
        let section = f.course.content[0].id;
        let ann = learner("Ann", &[f.course.id]);

        let course = f
            .service
            .add_question(&ann, f.course.id, section, "What is a borrow?".to_string())
            .await
            .expect("question");
        let question = course.content[0].questions[0].id;

        f.service
            .add_answer(&ann, f.course.id, section, question, "Found it".to_string())
            .await
            .expect("answer");

        let notes = notifications(&f.queue);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].title, "Câu hỏi mới");
        assert_eq!(notes[0].message, "Có câu hỏi mới trong khóa học Rust 101");
        assert_eq!(notes[1].title, "Trả lời câu hỏi mới");
        assert_eq!(
            notes[1].message,
            "Có trả lời mới cho câu hỏi của bạn trong khóa học Intro"
        );
    }

    #[tokio::test]
    async fn answer_by_someone_else_emails_asker() {
        let f = fixture().await;
        let section = f.course.content[0].id;
        let ann = learner("Ann", &[f.course.id]);
        let course = f
            .service
            .add_question(&ann, f.course.id, section, "Why?".to_string())
            .await
            .expect("question");
        let question = course.content[0].questions[0].id;

        f.service
            .add_answer(&admin(), f.course.id, section, question, "Because".to_string())
            .await
            .expect("admin answer");

        let mails: Vec<MailMessage> = f
            .queue
            .effects()
            .into_iter()
            .filter_map(|e| match e {
                SideEffect::SendMail(m) => Some(m),
                SideEffect::Notify(_) => None,
            })
            .collect();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].recipient, "ann@example.com");
        assert_eq!(mails[0].subject, "Trả lời câu hỏi");
        assert_eq!(mails[0].template, QUESTION_REPLY);
        assert_eq!(mails[0].data["name"], serde_json::json!("Ann"));
        assert_eq!(mails[0].data["title"], serde_json::json!("Intro"));
    }

    #[tokio::test]
    async fn qa_requires_ownership_unless_admin() {
        let f = fixture().await;
        let section = f.course.content[0].id;
        let err = f
            .service
            .add_question(&learner("Bob", &[]), f.course.id, section, "Hi".to_string())
            .await
            .expect_err("not owned");
        assert!(matches!(err.current_context(), CatalogError::NotOwned { .. }));

        f.service
            .add_question(&admin(), f.course.id, section, "Hi".to_string())
            .await
            .expect("admin may ask");
    }

    #[tokio::test]
    async fn admin_reply_to_review() {
        let f = fixture().await;
        let owner = learner("Ann", &[f.course.id]);
        let course = f
            .service
            .add_review(&owner, f.course.id, 4, "nice".to_string())
            .await
            .expect("review");
        let review = course.reviews[0].id;

        let course = f
            .service
            .add_review_reply(&admin(), f.course.id, review, "thanks".to_string())
            .await
            .expect("reply");
        assert_eq!(course.reviews[0].replies.len(), 1);
        assert_eq!(course.reviews[0].replies[0].author.name, "Root");

        let err = f
            .service
            .add_review_reply(&admin(), f.course.id, ReviewId::new(), "x".to_string())
            .await
            .expect_err("unknown review");
        assert!(matches!(
            err.current_context(),
            CatalogError::ReviewNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn cache_outage_after_commit_still_queues_effects() {
        let f = fixture().await;
        let owner = learner("Ann", &[f.course.id]);
        f.kv.set_offline(true);

        let err = f
            .service
            .add_review(&owner, f.course.id, 5, "great".to_string())
            .await
            .expect_err("cache write fails");
        assert!(matches!(
            err.current_context(),
            CatalogError::CacheWrite { .. }
        ));

        let stored = f
            .store
            .find_by_id(f.course.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(stored.reviews.len(), 1);
        assert_eq!(notifications(&f.queue).len(), 1);
    }
}

//! Course documents.
//!
//! A course is stored and cached as one document: metadata, reviews, and the
//! content sections with their Q&A threads. Anonymous readers only ever see
//! the [`CoursePreview`] projection, which drops everything inside a section
//! except its outline.

use crate::error::CatalogError;
use chrono::{DateTime, Utc};
use coursehub_core::{ContentId, CourseId, QuestionId, ReplyId, ReviewId, UserId};
use coursehub_platform_access::User;
use serde::{Deserialize, Serialize};

/// Lowest accepted review rating.
pub const MIN_RATING: u8 = 1;
/// Highest accepted review rating.
pub const MAX_RATING: u8 = 5;

/// Who wrote a review, question, or reply, as of the time of writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    /// Empty in public projections.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
}

impl Author {
    fn redacted(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            email: String::new(),
        }
    }
}

impl From<&User> for Author {
    fn from(user: &User) -> Self {
        Self {
            id: user.id(),
            name: user.name().to_string(),
            email: user.email().to_string(),
        }
    }
}

/// A reply in a review or question thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub id: ReplyId,
    pub author: Author,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reply {
    fn new(author: Author, text: String) -> Self {
        let now = Utc::now();
        Self {
            id: ReplyId::new(),
            author,
            text,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A rated review by a course owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub author: Author,
    pub rating: u8,
    pub comment: String,
    #[serde(default)]
    pub replies: Vec<Reply>,
    pub created_at: DateTime<Utc>,
}

/// A question asked against a content section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub author: Author,
    pub text: String,
    #[serde(default)]
    pub replies: Vec<Reply>,
    pub created_at: DateTime<Utc>,
}

/// A titled external link attached to a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub title: String,
    pub url: String,
}

/// One unit of purchasable content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSection {
    pub id: ContentId,
    pub title: String,
    pub description: String,
    pub video_url: String,
    /// Chapter heading this section is grouped under.
    pub video_section: String,
    /// Video length in minutes.
    pub video_length: u32,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// Section outline visible without owning the course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPreview {
    pub id: ContentId,
    pub title: String,
    pub description: String,
    pub video_section: String,
    pub video_length: u32,
}

impl From<&ContentSection> for SectionPreview {
    fn from(section: &ContentSection) -> Self {
        Self {
            id: section.id,
            title: section.title.clone(),
            description: section.description.clone(),
            video_section: section.video_section.clone(),
            video_length: section.video_length,
        }
    }
}

/// The full course document as stored and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub description: String,
    /// Price in whole currency units.
    pub price: i64,
    /// Pre-discount price shown struck through, if any.
    pub estimated_price: Option<i64>,
    pub tags: String,
    pub level: String,
    pub demo_url: String,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Number of completed purchases.
    pub purchased: i64,
    /// Mean of all review ratings, 0 when there are none.
    pub rating: f64,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub content: Vec<ContentSection>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The public projection of a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoursePreview {
    pub id: CourseId,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub estimated_price: Option<i64>,
    pub tags: String,
    pub level: String,
    pub demo_url: String,
    pub benefits: Vec<String>,
    pub prerequisites: Vec<String>,
    pub purchased: i64,
    pub rating: f64,
    pub reviews: Vec<Review>,
    pub sections: Vec<SectionPreview>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Section data supplied by an admin. A known `id` keeps the section's
/// existing Q&A thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionInput {
    #[serde(default)]
    pub id: Option<ContentId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub video_url: String,
    #[serde(default)]
    pub video_section: String,
    #[serde(default)]
    pub video_length: u32,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub suggestion: String,
}

/// Data for a new course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseInput {
    pub name: String,
    pub description: String,
    pub price: i64,
    #[serde(default)]
    pub estimated_price: Option<i64>,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub demo_url: String,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub content: Vec<SectionInput>,
}

/// Partial edit of a course. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub estimated_price: Option<i64>,
    pub tags: Option<String>,
    pub level: Option<String>,
    pub demo_url: Option<String>,
    pub benefits: Option<Vec<String>>,
    pub prerequisites: Option<Vec<String>>,
    pub content: Option<Vec<SectionInput>>,
}

/// What a new answer needs to notify the asker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerReceipt {
    pub reply_id: ReplyId,
    pub asker: Author,
    pub section_title: String,
}

fn require_text(field: &str, value: &str) -> Result<(), CatalogError> {
    if value.trim().is_empty() {
        return Err(CatalogError::invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_price(field: &str, value: i64) -> Result<(), CatalogError> {
    if value < 0 {
        return Err(CatalogError::invalid(format!("{field} must not be negative")));
    }
    Ok(())
}

impl SectionInput {
    fn validate(&self) -> Result<(), CatalogError> {
        require_text("section title", &self.title)?;
        require_text("section video url", &self.video_url)
    }

    fn into_section(self, questions: Vec<Question>) -> ContentSection {
        ContentSection {
            id: self.id.unwrap_or_else(ContentId::new),
            title: self.title,
            description: self.description,
            video_url: self.video_url,
            video_section: self.video_section,
            video_length: self.video_length,
            links: self.links,
            suggestion: self.suggestion,
            questions,
        }
    }
}

impl Course {
    /// Builds a new course from admin input.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if a required field is empty or a price is negative.
    pub fn create(input: CourseInput) -> Result<Self, CatalogError> {
        require_text("name", &input.name)?;
        require_text("description", &input.description)?;
        require_price("price", input.price)?;
        if let Some(estimated) = input.estimated_price {
            require_price("estimated price", estimated)?;
        }
        for section in &input.content {
            section.validate()?;
        }

        let now = Utc::now();
        Ok(Self {
            id: CourseId::new(),
            name: input.name,
            description: input.description,
            price: input.price,
            estimated_price: input.estimated_price,
            tags: input.tags,
            level: input.level,
            demo_url: input.demo_url,
            benefits: input.benefits,
            prerequisites: input.prerequisites,
            purchased: 0,
            rating: 0.0,
            reviews: Vec::new(),
            content: input
                .content
                .into_iter()
                .map(|s| s.into_section(Vec::new()))
                .collect(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies an admin edit.
    ///
    /// Replacing the content keeps the Q&A of sections whose id is supplied.
    /// Validation happens before anything is changed.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if any supplied field fails validation.
    pub fn apply(&mut self, update: CourseUpdate) -> Result<(), CatalogError> {
        if let Some(name) = &update.name {
            require_text("name", name)?;
        }
        if let Some(description) = &update.description {
            require_text("description", description)?;
        }
        if let Some(price) = update.price {
            require_price("price", price)?;
        }
        if let Some(estimated) = update.estimated_price {
            require_price("estimated price", estimated)?;
        }
        if let Some(sections) = &update.content {
            for section in sections {
                section.validate()?;
            }
        }

        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if update.estimated_price.is_some() {
            self.estimated_price = update.estimated_price;
        }
        if let Some(tags) = update.tags {
            self.tags = tags;
        }
        if let Some(level) = update.level {
            self.level = level;
        }
        if let Some(demo_url) = update.demo_url {
            self.demo_url = demo_url;
        }
        if let Some(benefits) = update.benefits {
            self.benefits = benefits;
        }
        if let Some(prerequisites) = update.prerequisites {
            self.prerequisites = prerequisites;
        }
        if let Some(sections) = update.content {
            let mut previous = std::mem::take(&mut self.content);
            self.content = sections
                .into_iter()
                .map(|input| {
                    let questions = input
                        .id
                        .and_then(|id| previous.iter_mut().find(|s| s.id == id))
                        .map(|s| std::mem::take(&mut s.questions))
                        .unwrap_or_default();
                    input.into_section(questions)
                })
                .collect();
        }
        self.touch();
        Ok(())
    }

    /// Returns the public projection.
    #[must_use]
    pub fn preview(&self) -> CoursePreview {
        CoursePreview {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            price: self.price,
            estimated_price: self.estimated_price,
            tags: self.tags.clone(),
            level: self.level.clone(),
            demo_url: self.demo_url.clone(),
            benefits: self.benefits.clone(),
            prerequisites: self.prerequisites.clone(),
            purchased: self.purchased,
            rating: self.rating,
            reviews: self
                .reviews
                .iter()
                .map(|review| Review {
                    author: review.author.redacted(),
                    replies: review
                        .replies
                        .iter()
                        .map(|reply| Reply {
                            author: reply.author.redacted(),
                            ..reply.clone()
                        })
                        .collect(),
                    ..review.clone()
                })
                .collect(),
            sections: self.content.iter().map(SectionPreview::from).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Returns the content section with this id.
    #[must_use]
    pub fn section(&self, content_id: ContentId) -> Option<&ContentSection> {
        self.content.iter().find(|s| s.id == content_id)
    }

    fn section_mut(&mut self, content_id: ContentId) -> Result<&mut ContentSection, CatalogError> {
        self.content
            .iter_mut()
            .find(|s| s.id == content_id)
            .ok_or(CatalogError::ContentNotFound { content_id })
    }

    /// Appends a review and recomputes the average rating.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the rating is outside 1..=5.
    pub fn add_review(
        &mut self,
        author: Author,
        rating: u8,
        comment: String,
    ) -> Result<ReviewId, CatalogError> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(CatalogError::invalid(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }
        let review = Review {
            id: ReviewId::new(),
            author,
            rating,
            comment,
            replies: Vec::new(),
            created_at: Utc::now(),
        };
        let id = review.id;
        self.reviews.push(review);
        self.recompute_rating();
        self.touch();
        Ok(id)
    }

    /// Sets `rating` to the simple mean of all review ratings.
    pub fn recompute_rating(&mut self) {
        self.rating = if self.reviews.is_empty() {
            0.0
        } else {
            let total: u32 = self.reviews.iter().map(|r| u32::from(r.rating)).sum();
            f64::from(total) / self.reviews.len() as f64
        };
    }

    /// Appends a reply to a review.
    ///
    /// # Errors
    ///
    /// Returns `ReviewNotFound` or `Invalid` for empty text.
    pub fn add_review_reply(
        &mut self,
        review_id: ReviewId,
        author: Author,
        text: String,
    ) -> Result<ReplyId, CatalogError> {
        require_text("reply", &text)?;
        let review = self
            .reviews
            .iter_mut()
            .find(|r| r.id == review_id)
            .ok_or(CatalogError::ReviewNotFound { review_id })?;
        let reply = Reply::new(author, text);
        let id = reply.id;
        review.replies.push(reply);
        self.touch();
        Ok(id)
    }

    /// Adds a question to a content section.
    ///
    /// # Errors
    ///
    /// Returns `ContentNotFound` or `Invalid` for empty text.
    pub fn add_question(
        &mut self,
        content_id: ContentId,
        author: Author,
        text: String,
    ) -> Result<QuestionId, CatalogError> {
        require_text("question", &text)?;
        let section = self.section_mut(content_id)?;
        let question = Question {
            id: QuestionId::new(),
            author,
            text,
            replies: Vec::new(),
            created_at: Utc::now(),
        };
        let id = question.id;
        section.questions.push(question);
        self.touch();
        Ok(id)
    }

    /// Answers a question.
    ///
    /// # Errors
    ///
    /// Returns `ContentNotFound`, `QuestionNotFound`, or `Invalid` for empty
    /// text.
    pub fn add_answer(
        &mut self,
        content_id: ContentId,
        question_id: QuestionId,
        author: Author,
        text: String,
    ) -> Result<AnswerReceipt, CatalogError> {
        require_text("answer", &text)?;
        let section = self.section_mut(content_id)?;
        let section_title = section.title.clone();
        let question = section
            .questions
            .iter_mut()
            .find(|q| q.id == question_id)
            .ok_or(CatalogError::QuestionNotFound { question_id })?;
        let reply = Reply::new(author, text);
        let receipt = AnswerReceipt {
            reply_id: reply.id,
            asker: question.author.clone(),
            section_title,
        };
        question.replies.push(reply);
        self.touch();
        Ok(receipt)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursehub_platform_access::Role;

    fn author(name: &str) -> Author {
        Author::from(&User::new(
            name.to_string(),
            format!("{}@example.com", name.to_lowercase()),
            Role::Learner,
        ))
    }

    fn section(title: &str) -> SectionInput {
        SectionInput {
            id: None,
            title: title.to_string(),
            description: "about it".to_string(),
            video_url: "https://video.example.com/1".to_string(),
            video_section: "Basics".to_string(),
            video_length: 12,
            links: vec![Link {
                title: "docs".to_string(),
                url: "https://docs.example.com".to_string(),
            }],
            suggestion: "take notes".to_string(),
        }
    }

    fn course() -> Course {
        Course::create(CourseInput {
            name: "Rust 101".to_string(),
            description: "Ownership and borrowing".to_string(),
            price: 100_000,
            estimated_price: Some(150_000),
            tags: "rust".to_string(),
            level: "beginner".to_string(),
            demo_url: "https://demo.example.com".to_string(),
            benefits: vec!["confidence".to_string()],
            prerequisites: Vec::new(),
            content: vec![section("Intro"), section("Traits")],
        })
        .expect("valid course")
    }

    #[test]
    fn create_starts_with_no_purchases_or_reviews() {
        let course = course();
        assert_eq!(course.purchased, 0);
        assert_eq!(course.rating, 0.0);
        assert!(course.reviews.is_empty());
        assert_eq!(course.content.len(), 2);
    }

    #[test]
    fn create_rejects_negative_price() {
        let result = Course::create(CourseInput {
            name: "Bad".to_string(),
            description: "x".to_string(),
            price: -1,
            estimated_price: None,
            tags: String::new(),
            level: String::new(),
            demo_url: String::new(),
            benefits: Vec::new(),
            prerequisites: Vec::new(),
            content: Vec::new(),
        });
        assert!(matches!(result, Err(CatalogError::Invalid { .. })));
    }

    #[test]
    fn preview_strips_section_internals() {
        let course = course();
        let preview = course.preview();

        assert_eq!(preview.sections.len(), 2);
        let json = serde_json::to_value(&preview).expect("serialize");
        let text = json.to_string();
        assert!(!text.contains("video.example.com"));
        assert!(!text.contains("docs.example.com"));
        assert!(!text.contains("take notes"));
        assert!(!text.contains("questions"));
        assert_eq!(json["sections"][0]["title"], "Intro");
    }

    #[test]
    fn preview_hides_reviewer_email() {
        let mut course = course();
        course
            .add_review(author("Ann"), 5, "great".to_string())
            .expect("review");

        let preview = course.preview();
        assert_eq!(preview.reviews[0].author.name, "Ann");
        let text = serde_json::to_string(&preview).expect("serialize");
        assert!(!text.contains("ann@example.com"));
        assert!(serde_json::to_string(&course).expect("serialize").contains("ann@example.com"));
    }

    #[test]
    fn rating_is_simple_mean() {
        let mut course = course();
        for rating in [5, 3, 4] {
            course
                .add_review(author("Ann"), rating, "fine".to_string())
                .expect("review");
        }
        assert_eq!(course.rating, 4.0);
        assert_eq!(course.reviews.len(), 3);
    }

    #[test]
    fn rating_out_of_range_is_rejected() {
        let mut course = course();
        assert!(matches!(
            course.add_review(author("Ann"), 0, "meh".to_string()),
            Err(CatalogError::Invalid { .. })
        ));
        assert!(matches!(
            course.add_review(author("Ann"), 6, "wow".to_string()),
            Err(CatalogError::Invalid { .. })
        ));
        assert!(course.reviews.is_empty());
    }

    #[test]
    fn question_and_answer_thread() {
        let mut course = course();
        let content_id = course.content[0].id;
        let asker = author("Ann");

        let question_id = course
            .add_question(content_id, asker.clone(), "Why?".to_string())
            .expect("question");
        let receipt = course
            .add_answer(content_id, question_id, author("Bob"), "Because.".to_string())
            .expect("answer");

        assert_eq!(receipt.asker, asker);
        assert_eq!(receipt.section_title, "Intro");
        let question = &course.section(content_id).expect("section").questions[0];
        assert_eq!(question.replies.len(), 1);
        assert_eq!(question.replies[0].text, "Because.");
    }

    #[test]
    fn question_on_unknown_section_fails() {
        let mut course = course();
        let content_id = ContentId::new();
        assert_eq!(
            course.add_question(content_id, author("Ann"), "Why?".to_string()),
            Err(CatalogError::ContentNotFound { content_id })
        );
    }

    #[test]
    fn answer_to_unknown_question_fails() {
        let mut course = course();
        let content_id = course.content[0].id;
        let question_id = QuestionId::new();
        assert_eq!(
            course.add_answer(content_id, question_id, author("Bob"), "Hm".to_string()),
            Err(CatalogError::QuestionNotFound { question_id })
        );
    }

    #[test]
    fn review_reply_requires_existing_review() {
        let mut course = course();
        let review_id = course
            .add_review(author("Ann"), 5, "great".to_string())
            .expect("review");

        course
            .add_review_reply(review_id, author("Admin"), "thanks".to_string())
            .expect("reply");
        assert_eq!(course.reviews[0].replies.len(), 1);

        let missing = ReviewId::new();
        assert_eq!(
            course.add_review_reply(missing, author("Admin"), "hi".to_string()),
            Err(CatalogError::ReviewNotFound { review_id: missing })
        );
    }

    #[test]
    fn apply_keeps_questions_of_retained_sections() {
        let mut course = course();
        let kept = course.content[0].id;
        course
            .add_question(kept, author("Ann"), "Why?".to_string())
            .expect("question");

        let mut retained = section("Intro, revised");
        retained.id = Some(kept);
        course
            .apply(CourseUpdate {
                price: Some(90_000),
                content: Some(vec![retained, section("New")]),
                ..CourseUpdate::default()
            })
            .expect("apply");

        assert_eq!(course.price, 90_000);
        assert_eq!(course.content.len(), 2);
        let revised = course.section(kept).expect("kept section");
        assert_eq!(revised.title, "Intro, revised");
        assert_eq!(revised.questions.len(), 1);
        assert!(course.content[1].questions.is_empty());
    }

    #[test]
    fn apply_validates_before_mutating() {
        let mut course = course();
        let before = course.clone();
        let result = course.apply(CourseUpdate {
            name: Some("Renamed".to_string()),
            price: Some(-5),
            ..CourseUpdate::default()
        });

        assert!(matches!(result, Err(CatalogError::Invalid { .. })));
        assert_eq!(course, before);
    }
}

//! Course catalog and entitlements for coursehub.
//!
//! This crate provides:
//! - Course documents with reviews and Q&A threads (`Course`)
//! - Store ports for users, courses, orders, and notifications
//! - The read-through, write-through course cache (`CourseCache`)
//! - Purchase completion (`PurchaseEngine`)
//! - Course reads and mutations behind the HTTP routes (`CourseService`)
//! - At-least-once side effects: email and notifications (`SideEffectQueue`)
//! - Payment and video-playback provider ports
//! - In-memory adapters for every port (`memory`)

pub mod cache;
pub mod content;
pub mod course;
pub mod error;
pub mod mail;
pub mod memory;
pub mod notification;
pub mod order;
pub mod payment;
pub mod purchase;
pub mod side_effect;
pub mod store;
pub mod templates;
pub mod video;

// Re-export main types at crate root
pub use cache::{CourseCache, DEFAULT_COURSE_TTL};
pub use content::CourseService;
pub use course::{
    AnswerReceipt, Author, ContentSection, Course, CourseInput, CoursePreview, CourseUpdate,
    Link, Question, Reply, Review, SectionInput, SectionPreview,
};
pub use error::{CatalogError, PurchaseError, StoreError};
pub use mail::{MailError, MailMessage, Mailer, RenderedMail};
pub use notification::{Notification, NotificationStatus};
pub use order::Order;
pub use payment::{NewPaymentIntent, PaymentError, PaymentIntent, PaymentProcessor, PaymentStatus};
pub use purchase::{PurchaseEngine, PurchaseRequest};
pub use side_effect::{
    ChannelQueue, DEFAULT_QUEUE_CAPACITY, Envelope, RetryPolicy, SideEffect, SideEffectDispatcher, SideEffectError,
    SideEffectQueue,
};
pub use store::{CourseStore, GrantOutcome, NotificationStore, OrderStore, UserStore};
pub use templates::TemplateRenderer;
pub use video::{PLAYBACK_OTP_TTL_SECS, VideoError, VideoPlayback, VideoProvider};

//! Core domain types and utilities for the coursehub platform.
//!
//! This crate provides the strongly-typed identifiers and the shared
//! `Result` alias used throughout the coursehub e-learning backend.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{
    ContentId, CourseId, NotificationId, OrderId, ParseIdError, QuestionId, ReplyId, ReviewId,
    UserId,
};

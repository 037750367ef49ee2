//! In-app notifications.

use chrono::{DateTime, Utc};
use coursehub_core::{NotificationId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a notification has been seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[default]
    Unread,
    Read,
}

impl NotificationStatus {
    /// Returns the lowercase stored name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::Read => "read",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unread" => Ok(Self::Unread),
            "read" => Ok(Self::Read),
            other => Err(format!("unknown notification status '{other}'")),
        }
    }
}

/// A message shown in a user's notification feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Creates an unread notification for the user.
    #[must_use]
    pub fn new(user_id: UserId, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            title: title.into(),
            message: message.into(),
            status: NotificationStatus::Unread,
            created_at: Utc::now(),
        }
    }

    /// Marks the notification as read.
    pub fn mark_read(&mut self) {
        self.status = NotificationStatus::Read;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_notification_is_unread() {
        let n = Notification::new(UserId::new(), "Đơn hàng mới", "ok");
        assert_eq!(n.status, NotificationStatus::Unread);
    }

    #[test]
    fn mark_read() {
        let mut n = Notification::new(UserId::new(), "t", "m");
        n.mark_read();
        assert_eq!(n.status, NotificationStatus::Read);
    }

    #[test]
    fn status_defaults_when_absent() {
        let json = serde_json::json!({
            "id": NotificationId::new(),
            "user_id": UserId::new(),
            "title": "t",
            "message": "m",
            "created_at": "2026-10-18T00:00:00Z",
        });
        let n: Notification = serde_json::from_value(json).expect("deserialize");
        assert_eq!(n.status, NotificationStatus::Unread);
    }

    #[test]
    fn status_parses_stored_names() {
        assert_eq!("read".parse(), Ok(NotificationStatus::Read));
        assert_eq!("unread".parse(), Ok(NotificationStatus::Unread));
        assert!("archived".parse::<NotificationStatus>().is_err());
    }
}

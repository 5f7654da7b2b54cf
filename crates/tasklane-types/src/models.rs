use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Extreme,
    Moderate,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Extreme, Priority::Moderate, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Extreme => "Extreme",
            Priority::Moderate => "Moderate",
            Priority::Low => "Low",
        }
    }
}

impl FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a todo. `Completed` and `Expired` are terminal for the
/// expiry sweep; only user edits move a todo out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TodoStatus {
    Pending,
    Completed,
    Expired,
}

impl TodoStatus {
    pub const ALL: [TodoStatus; 3] = [TodoStatus::Pending, TodoStatus::Completed, TodoStatus::Expired];

    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "Pending",
            TodoStatus::Completed => "Completed",
            TodoStatus::Expired => "Expired",
        }
    }
}

impl FromStr for TodoStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TodoStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: Uuid,
    pub title: String,
    /// Rich text, stored as markup.
    pub description: String,
    /// When the task is scheduled to happen.
    pub date: DateTime<Utc>,
    pub priority: Priority,
    pub completed: bool,
    /// Deadline after which the task is considered lapsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<DateTime<Utc>>,
    pub status: TodoStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A browser push endpoint. The endpoint URL is the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: PushKeys,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// JSON body handed to the service worker. Clients collapse notifications
/// sharing the same `tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub tag: String,
}

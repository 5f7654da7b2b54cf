//! SQLite row types and their conversion to the shared models, so callers
//! never see raw millisecond timestamps.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::Row;

use tasklane_types::models::{PushKeys, PushSubscription, Todo};

pub struct TodoRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: i64,
    pub priority: String,
    pub completed: bool,
    pub expire_at: Option<i64>,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

pub const TODO_COLUMNS: &str =
    "id, title, description, date, priority, completed, expire_at, status, created_at, updated_at";

impl TodoRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            date: row.get(3)?,
            priority: row.get(4)?,
            completed: row.get(5)?,
            expire_at: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    pub fn into_todo(self) -> Result<Todo> {
        Ok(Todo {
            id: self
                .id
                .parse()
                .map_err(|e| anyhow!("Corrupt todo id '{}': {}", self.id, e))?,
            title: self.title,
            description: self.description,
            date: from_millis(self.date)?,
            priority: self
                .priority
                .parse()
                .map_err(|e| anyhow!("Corrupt priority on todo '{}': {}", self.id, e))?,
            completed: self.completed,
            expire_at: self.expire_at.map(from_millis).transpose()?,
            status: self
                .status
                .parse()
                .map_err(|e| anyhow!("Corrupt status on todo '{}': {}", self.id, e))?,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

pub struct SubscriptionRow {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub user_id: Option<String>,
}

impl SubscriptionRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            endpoint: row.get(0)?,
            p256dh: row.get(1)?,
            auth: row.get(2)?,
            user_id: row.get(3)?,
        })
    }
}

impl From<SubscriptionRow> for PushSubscription {
    fn from(row: SubscriptionRow) -> Self {
        PushSubscription {
            endpoint: row.endpoint,
            keys: PushKeys {
                p256dh: row.p256dh,
                auth: row.auth,
            },
            user_id: row.user_id,
        }
    }
}

pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| anyhow!("Timestamp out of range: {}", ms))
}

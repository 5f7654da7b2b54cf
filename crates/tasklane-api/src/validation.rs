use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use tasklane_types::api::{SubscribeRequest, TodoRequest};
use tasklane_types::models::{Priority, PushKeys, PushSubscription, TodoStatus};

use crate::error::FieldErrors;

const MIN_TITLE_LEN: usize = 3;
const MIN_DESCRIPTION_LEN: usize = 10;

/// Create rejects due dates in the past. Edit does not: an overdue todo must
/// still be editable, e.g. to mark it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Create,
    Edit,
}

/// A todo request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidTodo {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub priority: Priority,
    pub expire_at: Option<DateTime<Utc>>,
    pub completed: Option<bool>,
    /// A recognised status; anything else is `None`.
    pub status: Option<TodoStatus>,
}

/// `Ok(None)` for an absent or null field, `Err` when the value has another
/// JSON type than `extract` accepts.
fn typed<'a, T>(value: &'a Option<Value>, extract: impl Fn(&'a Value) -> Option<T>) -> Result<Option<T>, ()> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => extract(v).map(Some).ok_or(()),
    }
}

pub fn validate_todo(req: &TodoRequest, intent: Intent, now: DateTime<Utc>) -> Result<ValidTodo, FieldErrors> {
    let mut errors = FieldErrors::new();

    let title = match typed(&req.title, Value::as_str) {
        Err(()) => {
            errors.insert("title", "Title must be a string".into());
            ""
        }
        Ok(raw) => {
            let title = raw.map(str::trim).unwrap_or_default();
            if title.is_empty() {
                errors.insert("title", "Title is required".into());
            } else if title.chars().count() < MIN_TITLE_LEN {
                errors.insert("title", "Title must be at least 3 characters long".into());
            }
            title
        }
    };

    let description = match typed(&req.description, Value::as_str) {
        Err(()) => {
            errors.insert("description", "Description must be a string".into());
            ""
        }
        Ok(raw) => {
            let description = raw.unwrap_or_default();
            let text_len = plain_text_len(description);
            if text_len == 0 {
                errors.insert("description", "Description is required".into());
            } else if text_len < MIN_DESCRIPTION_LEN {
                errors.insert("description", "Description must be at least 10 characters long".into());
            }
            description
        }
    };

    let date = match typed(&req.date, Value::as_str).map(|raw| raw.map(str::trim).filter(|s| !s.is_empty())) {
        Ok(None) => {
            errors.insert("date", "Date is required".into());
            None
        }
        Err(()) => {
            errors.insert("date", "Date must be a valid date".into());
            None
        }
        Ok(Some(raw)) => match parse_timestamp(raw) {
            None => {
                errors.insert("date", "Date must be a valid date".into());
                None
            }
            Some(date) if intent == Intent::Create && date < now => {
                errors.insert("date", "Date cannot be in the past".into());
                None
            }
            Some(date) => Some(date),
        },
    };

    let priority = typed(&req.priority, Value::as_str)
        .ok()
        .flatten()
        .and_then(|p| p.parse::<Priority>().ok());
    if priority.is_none() {
        errors.insert("priority", "Priority must be Extreme, Moderate, or Low".into());
    }

    let expire_at = match typed(&req.expire_at, Value::as_str).map(|raw| raw.map(str::trim).filter(|s| !s.is_empty())) {
        Ok(None) => None,
        Err(()) => {
            errors.insert("expireAt", "Expire time must be a valid date".into());
            None
        }
        Ok(Some(raw)) => match parse_timestamp(raw) {
            None => {
                errors.insert("expireAt", "Expire time must be a valid date".into());
                None
            }
            Some(at) => {
                if date.is_some_and(|d| at < d) {
                    errors.insert("expireAt", "Expire time cannot be before the task date".into());
                }
                Some(at)
            }
        },
    };

    let completed = typed(&req.completed, Value::as_bool).unwrap_or_else(|()| {
        errors.insert("completed", "Completed must be true or false".into());
        None
    });

    let status = match typed(&req.status, Value::as_str) {
        Err(()) => {
            errors.insert("status", "Status must be a string".into());
            None
        }
        Ok(raw) => raw.and_then(|s| s.parse::<TodoStatus>().ok()),
    };

    match (date, priority) {
        (Some(date), Some(priority)) if errors.is_empty() => Ok(ValidTodo {
            title: title.to_string(),
            description: description.to_string(),
            date,
            priority,
            expire_at,
            completed,
            status,
        }),
        _ => Err(errors),
    }
}

pub fn validate_subscription(req: &SubscribeRequest) -> Result<PushSubscription, FieldErrors> {
    let mut errors = FieldErrors::new();

    let endpoint = req.endpoint.as_deref().map(str::trim).unwrap_or_default();
    if endpoint.is_empty() {
        errors.insert("endpoint", "Endpoint is required".into());
    } else if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
        errors.insert("endpoint", "Endpoint must be an http(s) URL".into());
    }

    let keys = req
        .keys
        .as_ref()
        .filter(|k| !k.p256dh.trim().is_empty() && !k.auth.trim().is_empty());
    if keys.is_none() {
        errors.insert("keys", "Subscription keys p256dh and auth are required".into());
    }

    match keys {
        Some(keys) if errors.is_empty() => Ok(PushSubscription {
            endpoint: endpoint.to_string(),
            keys: PushKeys {
                p256dh: keys.p256dh.trim().to_string(),
                auth: keys.auth.trim().to_string(),
            },
            user_id: req.user_id.clone().filter(|u| !u.trim().is_empty()),
        }),
        _ => Err(errors),
    }
}

/// Accepts RFC 3339 or an HTML `datetime-local` value
/// (`YYYY-MM-DDTHH:MM[:SS]`), the latter read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Length of the visible text in a rich-text description: tags dropped,
/// common entities counted as one character, surrounding whitespace ignored.
/// A `<` opens a tag only when a letter, `/` or `!` follows it; any other
/// `<` is text.
pub fn plain_text_len(markup: &str) -> usize {
    let mut text = String::with_capacity(markup.len());
    let mut in_tag = false;
    let mut chars = markup.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '<' if !in_tag
                && chars
                    .peek()
                    .is_some_and(|next| next.is_ascii_alphabetic() || matches!(next, '/' | '!')) =>
            {
                in_tag = true
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = ["&nbsp;", "&amp;", "&lt;", "&gt;", "&quot;", "&#39;"]
        .iter()
        .zip([" ", "&", "<", ">", "\"", "'"])
        .fold(text, |acc, (entity, ch)| acc.replace(entity, ch));

    decoded.trim().chars().count()
}

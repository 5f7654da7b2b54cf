use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{PushKeys, Todo};

// -- Todos --

/// Body of both the create and the edit call. Fields are raw JSON values so
/// validation can report every problem by field, wrong types included,
/// instead of failing on the first deserialization error.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoRequest {
    pub title: Option<Value>,
    pub description: Option<Value>,
    pub date: Option<Value>,
    pub priority: Option<Value>,
    pub expire_at: Option<Value>,
    /// Edit only. Omitted keeps the stored flag.
    pub completed: Option<Value>,
    /// Edit only. Unknown values are ignored and the status is derived.
    pub status: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListResponse {
    pub todos: Vec<Todo>,
    pub current_page: u32,
    pub total_page: u32,
    pub total_todos: u64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTodoResponse {
    pub message: String,
    pub deleted_todo: Todo,
}

// -- Push --

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub endpoint: Option<String>,
    pub keys: Option<PushKeys>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VapidKeyResponse {
    pub public_key: String,
}

// -- Shared --

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use tasklane_db::TodoChanges;
use tasklane_types::api::{DeleteTodoResponse, TodoListResponse, TodoRequest};
use tasklane_types::models::Todo;
use tasklane_types::status::derive_status;

use crate::AppState;
use crate::error::{ApiError, run_blocking};
use crate::validation::{Intent, validate_todo};

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 100;

/// Raw query values; anything unparsable falls back to the defaults.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

fn positive(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// POST /todos/add
pub async fn create_todo(
    State(state): State<AppState>,
    payload: Result<Json<TodoRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let now = Utc::now();
    let valid = validate_todo(&req, Intent::Create, now).map_err(ApiError::Validation)?;

    let todo = Todo {
        id: Uuid::new_v4(),
        title: valid.title,
        description: valid.description,
        date: valid.date,
        priority: valid.priority,
        completed: false,
        expire_at: valid.expire_at,
        status: derive_status(valid.expire_at, None, now),
        created_at: now,
        updated_at: now,
    };

    let db = state.db.clone();
    let row = todo.clone();
    run_blocking(move || db.insert_todo(&row)).await?;

    info!("Created todo {} ({})", todo.id, todo.status);
    Ok((StatusCode::CREATED, Json(todo)))
}

/// GET /todos?page=&limit=
pub async fn list_todos(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<TodoListResponse>, ApiError> {
    let page = positive(query.page.as_deref(), DEFAULT_PAGE);
    let limit = positive(query.limit.as_deref(), DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = u64::from(page - 1) * u64::from(limit);

    let db = state.db.clone();
    let (total, todos) = run_blocking(move || {
        let total = db.count_todos()?;
        let todos = db.list_todos(offset, limit)?;
        Ok((total, todos))
    })
    .await?;

    Ok(Json(TodoListResponse {
        todos,
        current_page: page,
        total_page: total.div_ceil(u64::from(limit)) as u32,
        total_todos: total,
        has_next_page: u64::from(page) * u64::from(limit) < total,
        has_previous_page: page > 1,
    }))
}

/// GET /todos/{id}
pub async fn get_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Todo>, ApiError> {
    let db = state.db.clone();
    run_blocking(move || db.get_todo(&id))
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Todo not found"))
}

/// PUT /todos/edit/{id}
///
/// A valid `status` in the request wins. Otherwise the store keeps a
/// completed todo `Completed` and re-derives an open one, so only an edit
/// that clears `completed` can move a lapsed todo to `Expired`.
pub async fn edit_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<TodoRequest>, JsonRejection>,
) -> Result<Json<Todo>, ApiError> {
    let Json(req) = payload?;
    let now = Utc::now();
    let valid = validate_todo(&req, Intent::Edit, now).map_err(ApiError::Validation)?;

    let changes = TodoChanges {
        title: valid.title,
        description: valid.description,
        date: valid.date,
        priority: valid.priority,
        expire_at: valid.expire_at,
        completed: valid.completed,
        status: valid.status,
    };

    let db = state.db.clone();
    let updated = run_blocking(move || db.update_todo(&id, &changes, now))
        .await?
        .ok_or(ApiError::NotFound("Todo not found"))?;

    info!("Updated todo {} ({})", updated.id, updated.status);
    Ok(Json(updated))
}

/// DELETE /todos/delete/{id}
pub async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteTodoResponse>, ApiError> {
    let db = state.db.clone();
    let deleted = run_blocking(move || db.delete_todo(&id))
        .await?
        .ok_or(ApiError::NotFound("Todo not found"))?;

    info!("Deleted todo {}", deleted.id);
    Ok(Json(DeleteTodoResponse {
        message: "Todo deleted successfully".into(),
        deleted_todo: deleted,
    }))
}

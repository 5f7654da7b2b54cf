pub mod error;
pub mod push;
pub mod todos;
pub mod validation;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use tasklane_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    /// Application server key browsers subscribe with. `None` when push
    /// delivery is not configured.
    pub vapid_public_key: Option<String>,
}

/// All public routes. Middleware layers are added by the server binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/todos", get(todos::list_todos))
        .route("/todos/add", post(todos::create_todo))
        .route("/todos/edit/{id}", put(todos::edit_todo))
        .route("/todos/delete/{id}", delete(todos::delete_todo))
        .route("/todos/{id}", get(todos::get_todo))
        .route("/push/subscribe", post(push::subscribe))
        .route("/push/vapid-public-key", get(push::vapid_public_key))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

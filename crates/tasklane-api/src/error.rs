use std::collections::BTreeMap;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Field name -> message, serialized as `{ "errors": { ... } }`.
pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(FieldErrors),

    #[error("{0}")]
    NotFound(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "message": message }))).into_response()
            }
            ApiError::Internal(e) => {
                error!("Request failed: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": "Server error" })),
                )
                    .into_response()
            }
        }
    }
}

/// A body that is not a JSON object of the expected shape is reported under
/// the `body` key, like any other validation failure.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert("body", rejection.body_text());
        ApiError::Validation(errors)
    }
}

/// Run blocking store work off the async runtime.
pub async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
        .map_err(ApiError::Internal)
}

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;

use tasklane_types::api::{MessageResponse, SubscribeRequest, VapidKeyResponse};

use crate::AppState;
use crate::error::{ApiError, run_blocking};
use crate::validation::validate_subscription;

/// POST /push/subscribe. Idempotent on the endpoint URL.
pub async fn subscribe(
    State(state): State<AppState>,
    payload: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let subscription = validate_subscription(&req).map_err(ApiError::Validation)?;

    let db = state.db.clone();
    let endpoint = subscription.endpoint.clone();
    let inserted = run_blocking(move || db.upsert_subscription(&subscription, Utc::now())).await?;

    if inserted {
        info!("New push subscription: {}", endpoint);
        Ok((StatusCode::CREATED, Json(MessageResponse::new("Subscribed successfully"))))
    } else {
        Ok((StatusCode::OK, Json(MessageResponse::new("Already subscribed"))))
    }
}

/// GET /push/vapid-public-key
pub async fn vapid_public_key(
    State(state): State<AppState>,
) -> Result<Json<VapidKeyResponse>, ApiError> {
    state
        .vapid_public_key
        .clone()
        .map(|public_key| Json(VapidKeyResponse { public_key }))
        .ok_or(ApiError::NotFound("Push notifications are not configured"))
}

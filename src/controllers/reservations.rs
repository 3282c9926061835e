use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{AppJson, AppPath};
use crate::models::ReserveSpotsRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events/{event_id}/reserve", post(reserve_spots))
}

// POST /api/events/{event_id}/reserve
async fn reserve_spots(
    State(state): State<Arc<AppState>>,
    AppPath(event_id): AppPath<Uuid>,
    AppJson(req): AppJson<ReserveSpotsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tickets = state.reservations.reserve(event_id, req).await?;

    // listing now shows the spots as reserved
    state.cache.invalidate_spots(event_id).await;

    Ok((StatusCode::CREATED, Json(tickets)))
}

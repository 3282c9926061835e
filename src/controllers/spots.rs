use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::database::{is_foreign_key_violation, is_unique_violation};
use crate::error::ApiError;
use crate::extract::{AppJson, AppPath};
use crate::models::{Event, NewSpot, Spot, SpotChanges};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events/{event_id}/spots", get(list_spots).post(create_spot))
        .route(
            "/events/{event_id}/spots/{spot_id}",
            get(get_spot).patch(update_spot).delete(remove_spot),
        )
}

fn spot_not_found() -> ApiError {
    ApiError::NotFound("Spot not found".to_string())
}

fn duplicate_name(name: &str) -> ApiError {
    ApiError::BadRequest(format!("Spot {} already exists", name))
}

// POST /api/events/{event_id}/spots
async fn create_spot(
    State(state): State<Arc<AppState>>,
    AppPath(event_id): AppPath<Uuid>,
    AppJson(req): AppJson<NewSpot>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    if !Event::exists(&state.db, event_id).await? {
        return Err(ApiError::NotFound("Event not found".to_string()));
    }

    let spot = match Spot::create(&state.db, event_id, &req).await {
        Ok(spot) => spot,
        Err(e) if is_unique_violation(&e) => return Err(duplicate_name(&req.name)),
        Err(e) => return Err(e.into()),
    };

    state.cache.invalidate_spots(event_id).await;
    tracing::info!(%event_id, spot_id = %spot.id, "Spot created");

    Ok((StatusCode::CREATED, Json(spot)))
}

// GET /api/events/{event_id}/spots
async fn list_spots(
    State(state): State<Arc<AppState>>,
    AppPath(event_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let spots = state.cache.get_spots(event_id).await?;
    Ok((StatusCode::OK, Json(spots)))
}

// GET /api/events/{event_id}/spots/{spot_id}
async fn get_spot(
    State(state): State<Arc<AppState>>,
    AppPath((event_id, spot_id)): AppPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let spot = Spot::find_by_id(&state.db, event_id, spot_id)
        .await?
        .ok_or_else(spot_not_found)?;
    Ok((StatusCode::OK, Json(spot)))
}

// PATCH /api/events/{event_id}/spots/{spot_id}
async fn update_spot(
    State(state): State<Arc<AppState>>,
    AppPath((event_id, spot_id)): AppPath<(Uuid, Uuid)>,
    AppJson(changes): AppJson<SpotChanges>,
) -> Result<impl IntoResponse, ApiError> {
    changes.validate()?;

    let spot = match Spot::update(&state.db, event_id, spot_id, &changes).await {
        Ok(Some(spot)) => spot,
        Ok(None) => return Err(spot_not_found()),
        Err(e) if is_unique_violation(&e) => {
            return Err(duplicate_name(changes.name.as_deref().unwrap_or_default()))
        }
        Err(e) => return Err(e.into()),
    };

    state.cache.invalidate_spots(event_id).await;
    tracing::info!(%event_id, %spot_id, "Spot updated");

    Ok((StatusCode::OK, Json(spot)))
}

// DELETE /api/events/{event_id}/spots/{spot_id}
async fn remove_spot(
    State(state): State<Arc<AppState>>,
    AppPath((event_id, spot_id)): AppPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let spot = match Spot::delete(&state.db, event_id, spot_id).await {
        Ok(Some(spot)) => spot,
        Ok(None) => return Err(spot_not_found()),
        Err(e) if is_foreign_key_violation(&e) => {
            return Err(ApiError::BadRequest(
                "Spot is reserved and cannot be removed".to_string(),
            ))
        }
        Err(e) => return Err(e.into()),
    };

    state.cache.invalidate_spots(event_id).await;
    tracing::info!(%event_id, %spot_id, "Spot removed");

    Ok((StatusCode::OK, Json(spot)))
}

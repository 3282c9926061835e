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

use crate::database::is_foreign_key_violation;
use crate::error::ApiError;
use crate::extract::{AppJson, AppPath};
use crate::models::{event::parse_event_date, Event, EventChanges, NewEvent};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/{event_id}",
            get(get_event).patch(update_event).delete(remove_event),
        )
}

fn event_not_found() -> ApiError {
    ApiError::NotFound("Event not found".to_string())
}

fn parse_date(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, ApiError> {
    parse_event_date(raw).ok_or_else(|| ApiError::BadRequest("Invalid ISO8601 date".to_string()))
}

// POST /api/events
async fn create_event(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<NewEvent>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let date = parse_date(&req.date)?;

    let event = Event::create(&state.db, &req, date).await?;
    tracing::info!(event_id = %event.id, "Event created");

    Ok((StatusCode::CREATED, Json(event)))
}

// GET /api/events
async fn list_events(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let events = Event::find_all(&state.db).await?;
    Ok((StatusCode::OK, Json(events)))
}

// GET /api/events/{event_id}
async fn get_event(
    State(state): State<Arc<AppState>>,
    AppPath(event_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let event = Event::find_by_id(&state.db, event_id)
        .await?
        .ok_or_else(event_not_found)?;
    Ok((StatusCode::OK, Json(event)))
}

// PATCH /api/events/{event_id}
async fn update_event(
    State(state): State<Arc<AppState>>,
    AppPath(event_id): AppPath<Uuid>,
    AppJson(changes): AppJson<EventChanges>,
) -> Result<impl IntoResponse, ApiError> {
    changes.validate()?;
    let date = changes.date.as_deref().map(parse_date).transpose()?;

    let event = Event::update(&state.db, event_id, &changes, date)
        .await?
        .ok_or_else(event_not_found)?;
    tracing::info!(%event_id, "Event updated");

    Ok((StatusCode::OK, Json(event)))
}

// DELETE /api/events/{event_id}
async fn remove_event(
    State(state): State<Arc<AppState>>,
    AppPath(event_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let event = match Event::delete(&state.db, event_id).await {
        Ok(Some(event)) => event,
        Ok(None) => return Err(event_not_found()),
        Err(e) if is_foreign_key_violation(&e) => {
            return Err(ApiError::BadRequest(
                "Event has reserved spots and cannot be removed".to_string(),
            ))
        }
        Err(e) => return Err(e.into()),
    };

    state.cache.invalidate_spots(event_id).await;
    tracing::info!(%event_id, "Event removed");

    Ok((StatusCode::OK, Json(event)))
}

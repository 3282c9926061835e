use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::database::Database;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewEvent {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "Description must be between 1 and 255 characters"))]
    pub description: String,
    #[serde(default)]
    #[validate(custom(function = "validate_event_date", message = "Invalid ISO8601 date"))]
    pub date: String,
    #[validate(
        required(message = "Price must be a non-negative number"),
        range(exclusive_min = 0.0, message = "Price must be a non-negative number")
    )]
    pub price: Option<f64>,
}

/// Partial update of an event. Absent fields keep their stored value; present
/// ones follow the same rules as [`NewEvent`].
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct EventChanges {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Description must be between 1 and 255 characters"))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_event_date", message = "Invalid ISO8601 date"))]
    pub date: Option<String>,
    #[validate(range(exclusive_min = 0.0, message = "Price must be a non-negative number"))]
    pub price: Option<f64>,
}

/// Accepts full RFC 3339 timestamps and bare calendar dates (midnight UTC).
pub fn parse_event_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn validate_event_date(value: &str) -> Result<(), validator::ValidationError> {
    match parse_event_date(value) {
        Some(_) => Ok(()),
        None => Err(validator::ValidationError::new("date")),
    }
}

impl Event {
    /// Persists an already validated event; `date` is the parsed form of `event.date`.
    pub async fn create(db: &Database, event: &NewEvent, date: DateTime<Utc>) -> Result<Event, sqlx::Error> {
        sqlx::query_as::<_, Event>(
            "INSERT INTO events (id, name, description, date, price)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, name, description, date, price, created_at, updated_at"
        )
        .bind(Uuid::new_v4())
        .bind(&event.name)
        .bind(&event.description)
        .bind(date)
        .bind(event.price.unwrap_or_default())
        .fetch_one(&db.pool)
        .await
    }

    pub async fn find_all(db: &Database) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(
            "SELECT id, name, description, date, price, created_at, updated_at
             FROM events
             ORDER BY date"
        )
        .fetch_all(&db.pool)
        .await
    }

    pub async fn find_by_id(db: &Database, id: Uuid) -> Result<Option<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(
            "SELECT id, name, description, date, price, created_at, updated_at
             FROM events
             WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&db.pool)
        .await
    }

    /// Applies `changes`; `date` is the parsed form of `changes.date`.
    pub async fn update(
        db: &Database,
        id: Uuid,
        changes: &EventChanges,
        date: Option<DateTime<Utc>>,
    ) -> Result<Option<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(
            "UPDATE events
             SET name = COALESCE($2, name),
                 description = COALESCE($3, description),
                 date = COALESCE($4, date),
                 price = COALESCE($5, price),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING id, name, description, date, price, created_at, updated_at"
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(date)
        .bind(changes.price)
        .fetch_optional(&db.pool)
        .await
    }

    /// Removes the event and, through the cascade, its spots. Fails with a
    /// foreign key violation once any of those spots has been reserved.
    pub async fn delete(db: &Database, id: Uuid) -> Result<Option<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(
            "DELETE FROM events
             WHERE id = $1
             RETURNING id, name, description, date, price, created_at, updated_at"
        )
        .bind(id)
        .fetch_optional(&db.pool)
        .await
    }

    pub async fn exists(db: &Database, id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM events WHERE id = $1)")
            .bind(id)
            .fetch_one(&db.pool)
            .await
    }
}

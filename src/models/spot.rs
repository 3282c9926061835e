use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use super::UnknownVariant;
use crate::database::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpotStatus {
    Available,
    Reserved,
}

impl SpotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotStatus::Available => "available",
            SpotStatus::Reserved => "reserved",
        }
    }
}

impl fmt::Display for SpotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for SpotStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "available" => Ok(SpotStatus::Available),
            "reserved" => Ok(SpotStatus::Reserved),
            _ => Err(UnknownVariant { kind: "spot status", value }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spot {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub status: SpotStatus,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewSpot {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
}

/// Rename of a spot. Status only changes through a reservation.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SpotChanges {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,
}

impl Spot {
    // Insert a spot in the available state
    pub async fn create(db: &Database, event_id: Uuid, spot: &NewSpot) -> Result<Spot, sqlx::Error> {
        sqlx::query_as::<_, Spot>(
            "INSERT INTO spots (id, event_id, name, status)
             VALUES ($1, $2, $3, $4)
             RETURNING id, event_id, name, status"
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(&spot.name)
        .bind(SpotStatus::Available.as_str())
        .fetch_one(&db.pool)
        .await
    }

    pub async fn find_by_id(db: &Database, event_id: Uuid, id: Uuid) -> Result<Option<Spot>, sqlx::Error> {
        sqlx::query_as::<_, Spot>(
            "SELECT id, event_id, name, status
             FROM spots
             WHERE event_id = $1 AND id = $2"
        )
        .bind(event_id)
        .bind(id)
        .fetch_optional(&db.pool)
        .await
    }

    pub async fn update(
        db: &Database,
        event_id: Uuid,
        id: Uuid,
        changes: &SpotChanges,
    ) -> Result<Option<Spot>, sqlx::Error> {
        sqlx::query_as::<_, Spot>(
            "UPDATE spots
             SET name = COALESCE($3, name), updated_at = NOW()
             WHERE event_id = $1 AND id = $2
             RETURNING id, event_id, name, status"
        )
        .bind(event_id)
        .bind(id)
        .bind(&changes.name)
        .fetch_optional(&db.pool)
        .await
    }

    // Reserved spots are referenced by history and tickets, so deleting one
    // fails with a foreign key violation
    pub async fn delete(db: &Database, event_id: Uuid, id: Uuid) -> Result<Option<Spot>, sqlx::Error> {
        sqlx::query_as::<_, Spot>(
            "DELETE FROM spots
             WHERE event_id = $1 AND id = $2
             RETURNING id, event_id, name, status"
        )
        .bind(event_id)
        .bind(id)
        .fetch_optional(&db.pool)
        .await
    }

    pub async fn find_by_event(db: &Database, event_id: Uuid) -> Result<Vec<Spot>, sqlx::Error> {
        sqlx::query_as::<_, Spot>(
            "SELECT id, event_id, name, status
             FROM spots
             WHERE event_id = $1
             ORDER BY name"
        )
        .bind(event_id)
        .fetch_all(&db.pool)
        .await
    }
}

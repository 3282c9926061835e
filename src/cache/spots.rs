use redis::AsyncCommands;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::CacheService;
use crate::models::Spot;

fn spots_key(event_id: Uuid) -> String {
    format!("spots:{}", event_id)
}

impl CacheService {
    /// Spot listing of an event. Redis is a best-effort layer in front of
    /// Postgres: any Redis failure falls through to the database.
    ///
    /// A miss that reads Postgres before a reservation commits can write its
    /// listing after that reservation's `invalidate_spots`. The stale listing
    /// then lives until the TTL expires. Reservations never read this cache,
    /// so only the listing can lag, never the one-ticket-per-spot rule.
    pub async fn get_spots(&self, event_id: Uuid) -> Result<Vec<Spot>, sqlx::Error> {
        match self.get_spots_from_cache(event_id).await {
            Ok(Some(spots)) => {
                debug!(%event_id, "Spots cache hit");
                return Ok(spots);
            }
            Ok(None) => debug!(%event_id, "Spots cache miss"),
            Err(e) => warn!(%event_id, "Spots cache read failed: {:?}", e),
        }

        let spots = Spot::find_by_event(&self.db, event_id).await?;
        if let Err(e) = self.save_spots_to_cache(event_id, &spots).await {
            warn!(%event_id, "Spots cache write failed: {:?}", e);
        }
        Ok(spots)
    }

    pub async fn invalidate_spots(&self, event_id: Uuid) {
        let mut conn = self.redis.conn.clone();
        let result: Result<(), _> = conn.del(spots_key(event_id)).await;
        match result {
            Ok(()) => debug!(%event_id, "Invalidated spots cache"),
            Err(e) => warn!(%event_id, "Failed to invalidate spots cache: {:?}", e),
        }
    }

    async fn get_spots_from_cache(&self, event_id: Uuid) -> Result<Option<Vec<Spot>>, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let data: Option<String> = conn.get(spots_key(event_id)).await?;
        data.map(|raw| {
            serde_json::from_str(&raw).map_err(|_| {
                redis::RedisError::from((redis::ErrorKind::TypeError, "Parse error"))
            })
        })
        .transpose()
    }

    async fn save_spots_to_cache(&self, event_id: Uuid, spots: &[Spot]) -> Result<(), redis::RedisError> {
        let data = serde_json::to_string(spots).map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "Serialize error"))
        })?;
        let mut conn = self.redis.conn.clone();
        conn.set_ex(spots_key(event_id), data, self.spots_ttl_seconds).await
    }
}

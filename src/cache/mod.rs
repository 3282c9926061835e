use crate::{database::Database, models::Event, redis_client::RedisClient};
use tracing::{info, warn};

pub mod spots;

#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    db: Database,
    spots_ttl_seconds: u64,
}

impl CacheService {
    pub fn new(redis: RedisClient, db: Database, spots_ttl_seconds: u64) -> Self {
        Self { redis, db, spots_ttl_seconds }
    }

    // Preload spot listings of every known event
    pub async fn warmup_cache(&self) {
        info!("Starting cache warmup...");

        let events = match Event::find_all(&self.db).await {
            Ok(events) => events,
            Err(e) => {
                warn!("Cache warmup skipped, events unavailable: {:?}", e);
                return;
            }
        };

        for event in &events {
            if let Err(e) = self.get_spots(event.id).await {
                warn!(event_id = %event.id, "Cache warmup failed for event: {:?}", e);
            }
        }

        info!("Cache warmup done for {} events", events.len());
    }
}

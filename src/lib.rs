pub mod config;
pub mod database;
pub mod redis_client;
pub mod models;
pub mod controllers;
pub mod cache;
pub mod error;
pub mod extract;
pub mod services;
pub mod store;

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::task;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use services::ReservationService;
use store::PgStore;

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub redis: redis_client::RedisClient,
    pub cache: cache::CacheService,
    pub config: config::Config,
    pub reservations: ReservationService<PgStore>,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database).await?;
        tracing::info!("Database connected");

        db.run_migrations().await?;

        let redis = redis_client::RedisClient::new(&config.redis.url).await?;
        tracing::info!("Redis connected");

        let cache = cache::CacheService::new(redis.clone(), db.clone(), config.redis.spots_ttl_seconds);
        let reservations = ReservationService::new(
            PgStore::new(db.pool.clone()),
            config.reservation.isolation_level,
        );
        tracing::info!(
            isolation = %config.reservation.isolation_level,
            "Reservation coordinator ready"
        );

        let state = Arc::new(Self {
            db,
            redis,
            cache,
            config,
            reservations,
        });

        let state_for_bg = state.clone();
        task::spawn(async move {
            // Warm up the cache in the background
            state_for_bg.cache.warmup_cache().await;
        });

        Ok(state)
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Spot Reservation API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub mod events;
pub mod reservations;
pub mod spots;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(events::routes())
        .merge(spots::routes())
        .merge(reservations::routes())
}

//! Route modules of the development status server.

pub mod health;
pub mod status;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full status server router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(status::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

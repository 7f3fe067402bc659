//! Presenter status endpoints: the live snapshot and the story overview.

use axum::extract::State;
use axum::{Json, Router, routing::get};

use crate::state::{AppState, StatusSnapshot, StoryOverview};

/// GET /status
async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.status.borrow().clone())
}

/// GET /status/story
async fn story(State(state): State<AppState>) -> Json<StoryOverview> {
    Json(state.story)
}

/// Returns the status router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/status/story", get(story))
}

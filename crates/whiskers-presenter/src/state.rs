//! Shared state of the development status server.

use serde::Serialize;
use tokio::sync::watch;
use whiskers_sidechannel::{AudioStats, MinigameStats};
use whiskers_story::application::engine::{ProgressSummary, StoryPhase};
use whiskers_story::domain::state::GameState;
use whiskers_transport::ConnectionStats;

use crate::error::ErrorBanner;

/// Everything the presenter loop publishes after an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub game_state: GameState,
    pub phase: StoryPhase,
    pub progress: ProgressSummary,
    pub connection: ConnectionStats,
    pub audio: AudioStats,
    pub minigame: MinigameStats,
    pub last_error: Option<ErrorBanner>,
    pub errors_reported: u64,
}

/// Static facts about the loaded story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryOverview {
    pub version_hash: String,
    pub chapters: Vec<String>,
    pub chapter_types: Vec<&'static str>,
}

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Latest snapshot from the presenter loop.
    pub status: watch::Receiver<StatusSnapshot>,
    pub story: StoryOverview,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(status: watch::Receiver<StatusSnapshot>, story: StoryOverview) -> Self {
        Self { status, story }
    }
}

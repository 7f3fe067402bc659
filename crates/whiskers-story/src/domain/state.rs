//! The game state store: the single mutable record of a playthrough.
//!
//! Owned by the presenter loop and lent to the story engine for every
//! operation. Nothing else mutates it.

use serde::Serialize;

use super::chapter::START_CHAPTER;
use super::stats::PlayerStats;

/// A choice the player made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceRecord {
    /// Chapter the choice was made in.
    pub chapter: String,
    pub choice_index: usize,
    pub choice_text: String,
    pub timestamp: String,
}

/// A chapter entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterVisit {
    pub id: String,
    pub timestamp: String,
}

/// Progress through the story. Append-only within a playthrough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryProgress {
    pub choices_made: Vec<ChoiceRecord>,
    /// Target of the most recent choice.
    pub path_taken: String,
    pub chapters_completed: Vec<ChapterVisit>,
}

impl Default for StoryProgress {
    fn default() -> Self {
        Self {
            choices_made: Vec::new(),
            path_taken: START_CHAPTER.to_owned(),
            chapters_completed: Vec::new(),
        }
    }
}

/// Flags mirroring the state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatus {
    pub is_waiting_for_input: bool,
    pub minigame_active: bool,
    pub audio_playing: bool,
    pub game_ended: bool,
    pub current_choice_index: usize,
}

/// Transport status as seen by the game. Survives resets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    /// Timestamp of the last inbound message.
    pub last_message: Option<String>,
    pub development_mode: bool,
}

/// Outcome of one minigame, as kept in the game state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinigameRecord {
    pub minigame_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<u64>,
    pub timestamp: String,
}

/// The whole game state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub current_chapter: String,
    pub player_stats: PlayerStats,
    pub story_progress: StoryProgress,
    pub game_status: GameStatus,
    #[serde(rename = "mqttStatus")]
    pub connection: ConnectionStatus,
    pub minigame_results: Vec<MinigameRecord>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            current_chapter: START_CHAPTER.to_owned(),
            player_stats: PlayerStats::default(),
            story_progress: StoryProgress::default(),
            game_status: GameStatus::default(),
            connection: ConnectionStatus::default(),
            minigame_results: Vec::new(),
        }
    }
}

impl GameState {
    /// Fresh state for a session; `development_mode` is echoed in the
    /// connection status.
    #[must_use]
    pub fn new(development_mode: bool) -> Self {
        let mut state = Self::default();
        state.connection.development_mode = development_mode;
        state
    }

    /// Returns everything to initial values except the connection status.
    pub fn reset(&mut self) {
        let connection = std::mem::take(&mut self.connection);
        *self = Self {
            connection,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_values() {
        let state = GameState::new(true);

        assert_eq!(state.current_chapter, "start");
        assert_eq!(state.player_stats.health, 100);
        assert_eq!(state.player_stats.courage, "Normal");
        assert_eq!(state.player_stats.location, "Home");
        assert_eq!(state.story_progress.path_taken, "start");
        assert!(!state.game_status.is_waiting_for_input);
        assert!(state.connection.development_mode);
    }

    #[test]
    fn test_reset_keeps_connection_status() {
        // Arrange
        let mut state = GameState::new(false);
        state.connection.connected = true;
        state.connection.last_message = Some("2026-01-15T10:00:00.000Z".to_owned());
        state.player_stats.health = 20;
        state.game_status.game_ended = true;
        state.story_progress.choices_made.push(ChoiceRecord {
            chapter: "start".to_owned(),
            choice_index: 1,
            choice_text: "Nap".to_owned(),
            timestamp: "t".to_owned(),
        });

        // Act
        state.reset();

        // Assert
        assert_eq!(state.player_stats, PlayerStats::default());
        assert!(state.story_progress.choices_made.is_empty());
        assert!(!state.game_status.game_ended);
        assert!(state.connection.connected);
        assert_eq!(
            state.connection.last_message.as_deref(),
            Some("2026-01-15T10:00:00.000Z")
        );
    }

    #[test]
    fn test_serializes_with_wire_field_names() {
        let value = serde_json::to_value(GameState::default()).unwrap();

        assert!(value.get("mqttStatus").is_some());
        assert!(value["gameStatus"].get("isWaitingForInput").is_some());
        assert!(value["storyProgress"].get("chaptersCompleted").is_some());
    }
}

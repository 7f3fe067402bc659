//! Outbound notifications published to the orchestrator.
//!
//! The set is closed: every message the presenter can emit is a variant here,
//! serialized with its snake_case `type` tag and camelCase fields.

use serde::Serialize;
use serde_json::Value;
use whiskers_core::clock::Clock;
use whiskers_core::envelope::Envelope;
use whiskers_core::features::FeatureToggles;
use whiskers_core::signal::{AudioStatus, MinigameStatus};

use super::chapter::ChapterType;
use super::stats::PlayerStats;

/// One entry of a `choices_available` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceSummary {
    pub index: usize,
    pub text: String,
}

/// What kind of input the presenter is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputContext {
    /// A decision between several choices.
    Choices,
    /// A single continue action.
    Story,
}

impl InputContext {
    /// Input type the orchestrator should send.
    #[must_use]
    pub fn awaiting(self) -> &'static str {
        match self {
            Self::Choices => "choice",
            Self::Story => "proceed",
        }
    }
}

/// Scroll direction of the content viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Game context attached to an error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    pub chapter: String,
    pub waiting: bool,
}

/// Every outbound message type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Notification {
    AppReady {
        development_mode: bool,
        features_enabled: FeatureToggles,
        story_version: String,
    },
    ChoiceMade {
        chapter: String,
        choice_index: usize,
        choice_text: String,
        next_chapter: Option<String>,
    },
    ChapterChanged {
        current_chapter: String,
        chapter_title: String,
        chapter_type: ChapterType,
        has_choices: bool,
        player_state: PlayerStats,
    },
    ChoicesAvailable {
        chapter: String,
        choices: Vec<ChoiceSummary>,
        current_selection: usize,
    },
    ReadyForInput {
        context: InputContext,
        awaiting_input_type: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        available_choices: Option<usize>,
    },
    ScrollStatus {
        direction: ScrollDirection,
        at_top: bool,
        at_bottom: bool,
    },
    GameEnded {
        ending_type: Option<String>,
        ending_title: String,
        player_stats: PlayerStats,
        choices_made: usize,
    },
    GameReset,
    AdventureRestarted {
        previous_ending: Option<String>,
    },
    AudioStatus {
        status: AudioStatus,
        audio_file: String,
    },
    MinigameStatus {
        status: MinigameStatus,
        minigame_id: String,
        result: Option<Value>,
    },
    AppError {
        error_type: String,
        category: &'static str,
        message: String,
        game_state: ErrorContext,
    },
    AppPaused,
    AppResumed,
}

impl Notification {
    /// `ready_for_input` for the given context.
    #[must_use]
    pub fn ready_for_input(context: InputContext, choices: usize) -> Self {
        Self::ReadyForInput {
            context,
            awaiting_input_type: context.awaiting(),
            available_choices: (context == InputContext::Choices).then_some(choices),
        }
    }

    /// Wire type tag.
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::AppReady { .. } => "app_ready",
            Self::ChoiceMade { .. } => "choice_made",
            Self::ChapterChanged { .. } => "chapter_changed",
            Self::ChoicesAvailable { .. } => "choices_available",
            Self::ReadyForInput { .. } => "ready_for_input",
            Self::ScrollStatus { .. } => "scroll_status",
            Self::GameEnded { .. } => "game_ended",
            Self::GameReset => "game_reset",
            Self::AdventureRestarted { .. } => "adventure_restarted",
            Self::AudioStatus { .. } => "audio_status",
            Self::MinigameStatus { .. } => "minigame_status",
            Self::AppError { .. } => "app_error",
            Self::AppPaused => "app_paused",
            Self::AppResumed => "app_resumed",
        }
    }

    /// Converts to a timestamped envelope.
    ///
    /// # Panics
    ///
    /// Never in practice: every variant serializes to a tagged JSON object.
    #[must_use]
    pub fn into_envelope(self, clock: &dyn Clock) -> Envelope {
        let value = serde_json::to_value(&self).expect("notification serialization is infallible");
        let mut envelope =
            Envelope::from_tagged(value).expect("notifications serialize as tagged objects");
        envelope.stamp(clock);
        envelope
    }
}

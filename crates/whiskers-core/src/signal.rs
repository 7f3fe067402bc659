//! Side-channel callback contract.
//!
//! Audio and minigame adapters run asynchronously and report back through
//! [`SideChannelSignal`]s. Each signal carries the [`TaskId`] the story engine
//! handed out when it requested the work, so a completion that arrives after
//! the engine moved on can be recognised as stale and ignored.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of one side-channel task issued by the story engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Audio playback status for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioStatus {
    /// The file is being fetched.
    Loading,
    /// Playback started (or resumed).
    Started,
    /// Playback paused.
    Paused,
    /// Playback reached the end.
    Finished,
    /// Playback is blocked until the user interacts.
    Blocked,
    /// Playback failed; a placeholder takes over.
    Error,
}

impl AudioStatus {
    /// Whether audio is audible in this status.
    #[must_use]
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Started)
    }
}

/// Minigame status, as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinigameStatus {
    /// The minigame is running.
    Started,
    /// The minigame reported intermediate progress.
    Progress,
    /// The minigame finished successfully.
    Completed,
    /// The minigame finished unsuccessfully.
    Failed,
    /// Loading or running failed; a placeholder takes over.
    Error,
}

impl MinigameStatus {
    /// Wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Progress => "progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }
}

/// Outcome data reported by a finished minigame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinigameResult {
    /// Whether the player won.
    pub success: bool,
    /// Score, if the minigame keeps one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    /// How long the minigame ran, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<u64>,
}

/// Minigame lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum MinigameEvent {
    /// The minigame started.
    Started,
    /// Intermediate progress payload.
    Progress(Value),
    /// The minigame completed.
    Completed(MinigameResult),
    /// The minigame failed.
    Failed(MinigameResult),
    /// Loading or running failed.
    Error(String),
}

impl MinigameEvent {
    /// Wire status for this event.
    #[must_use]
    pub fn status(&self) -> MinigameStatus {
        match self {
            Self::Started => MinigameStatus::Started,
            Self::Progress(_) => MinigameStatus::Progress,
            Self::Completed(_) => MinigameStatus::Completed,
            Self::Failed(_) => MinigameStatus::Failed,
            Self::Error(_) => MinigameStatus::Error,
        }
    }

    /// Payload reported alongside the status, if any.
    #[must_use]
    pub fn payload(&self) -> Option<Value> {
        match self {
            Self::Started => None,
            Self::Progress(data) => Some(data.clone()),
            Self::Completed(result) | Self::Failed(result) => serde_json::to_value(result).ok(),
            Self::Error(message) => Some(serde_json::json!({ "error": message })),
        }
    }
}

/// A status report from a side-channel adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum SideChannelSignal {
    /// Audio status change.
    Audio {
        /// Task the playback belongs to.
        task: TaskId,
        /// File identifier, e.g. `chapter_start_main.mp3`.
        file: String,
        /// New status.
        status: AudioStatus,
    },
    /// Minigame lifecycle event.
    Minigame {
        /// Task the minigame belongs to.
        task: TaskId,
        /// Minigame identifier.
        minigame_id: String,
        /// What happened.
        event: MinigameEvent,
    },
}

impl SideChannelSignal {
    /// The task this signal reports on.
    #[must_use]
    pub fn task(&self) -> TaskId {
        match self {
            Self::Audio { task, .. } | Self::Minigame { task, .. } => *task,
        }
    }
}

//! Error taxonomy shared by every presenter component.
//!
//! Errors are caught at the boundary of the operation that raised them and
//! handed to the central reporter; none of these are meant to unwind past a
//! single command.

use thiserror::Error;

/// Content and authoring defects: the story data or the request does not
/// line up with the chapter table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// A chapter id did not resolve in the story book.
    #[error("chapter not found: {0}")]
    ChapterNotFound(String),

    /// A choice index was outside the current chapter's choices.
    #[error("invalid choice index {index}: {available} choice(s) available")]
    InvalidChoiceIndex {
        /// The rejected index, as received.
        index: i64,
        /// Number of choices on the current chapter.
        available: usize,
    },

    /// The story data failed to parse or validate.
    #[error("invalid story data: {0}")]
    InvalidStory(String),
}

/// Transport channel failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The broker did not acknowledge the connection in time.
    #[error("connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// The configured bound, in milliseconds.
        timeout_ms: u64,
    },

    /// Transport-level connection failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// A message could not be handed to the broker.
    #[error("publish failed: {0}")]
    Publish(String),

    /// An inbound payload was not a valid envelope.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The reconnect budget is exhausted.
    #[error("maximum reconnection attempts exceeded ({attempts})")]
    MaxReconnect {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

/// Audio and minigame side-channel failures. These are recovered by falling
/// back to a placeholder simulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SideChannelError {
    /// An asset could not be loaded.
    #[error("failed to load {subject}: {reason}")]
    Load {
        /// File or minigame identifier.
        subject: String,
        /// Backend-provided reason.
        reason: String,
    },

    /// Loading did not finish within the configured bound.
    #[error("loading {subject} timed out after {timeout_ms}ms")]
    LoadTimeout {
        /// File or minigame identifier.
        subject: String,
        /// The configured bound, in milliseconds.
        timeout_ms: u64,
    },

    /// Playback failed after loading.
    #[error("playback of {subject} failed: {reason}")]
    Playback {
        /// File or minigame identifier.
        subject: String,
        /// Backend-provided reason.
        reason: String,
    },

    /// Playback was refused until the user interacts with the presenter.
    #[error("playback of {0} blocked until user interaction")]
    Blocked(String),

    /// Input arrived while no minigame was running.
    #[error("no active minigame to receive input")]
    NoActiveMinigame,
}

/// Workspace-level error wrapping every component taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresenterError {
    /// Content or authoring defect.
    #[error(transparent)]
    Content(#[from] ContentError),

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Side-channel failure.
    #[error(transparent)]
    SideChannel(#[from] SideChannelError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PresenterError {
    /// Returns `true` for errors that are surfaced to the operator and never
    /// retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(TransportError::MaxReconnect { .. }))
    }

    /// Machine-readable category used in `app_error` notifications.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Content(_) => "content",
            Self::Transport(TransportError::MaxReconnect { .. }) => "fatal_reconnect",
            Self::Transport(_) => "transport",
            Self::SideChannel(_) => "side_channel",
            Self::Config(_) => "config",
        }
    }
}

//! Presenter error types and the central error reporter.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::error;
use whiskers_core::error::{ContentError, PresenterError};
use whiskers_story::domain::notifications::{ErrorContext, Notification};
use whiskers_story::domain::state::GameState;

/// How long an error banner stays up.
pub const BANNER_TTL: Duration = Duration::from_secs(5);

/// Startup errors for the presenter binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// A configuration value is invalid.
    #[error(transparent)]
    Config(#[from] PresenterError),

    /// The story file could not be read.
    #[error("failed to read story {path}: {source}")]
    StoryFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The story content is invalid.
    #[error(transparent)]
    Story(#[from] ContentError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// The most recent reported error, as shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBanner {
    pub error_type: String,
    pub category: &'static str,
    pub message: String,
    pub fatal: bool,
}

/// Turns operation failures into `app_error` notifications, a log line and a
/// short-lived banner.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    banner: Option<(ErrorBanner, Instant)>,
    fatal: bool,
    reported: u64,
}

impl ErrorReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure of `operation` and returns the notification to publish.
    pub fn report(
        &mut self,
        operation: &str,
        err: &PresenterError,
        state: &GameState,
    ) -> Notification {
        let fatal = err.is_fatal();
        error!(
            operation,
            category = err.category(),
            fatal,
            chapter = %state.current_chapter,
            error = %err,
            "operation failed"
        );
        self.reported += 1;
        self.fatal |= fatal;
        self.banner = Some((
            ErrorBanner {
                error_type: operation.to_owned(),
                category: err.category(),
                message: err.to_string(),
                fatal,
            },
            Instant::now(),
        ));
        Notification::AppError {
            error_type: operation.to_owned(),
            category: err.category(),
            message: err.to_string(),
            game_state: ErrorContext {
                chapter: state.current_chapter.clone(),
                waiting: state.game_status.is_waiting_for_input,
            },
        }
    }

    /// The current banner, if one was raised in the last five seconds.
    #[must_use]
    pub fn banner(&self) -> Option<&ErrorBanner> {
        self.banner
            .as_ref()
            .filter(|(_, raised)| raised.elapsed() < BANNER_TTL)
            .map(|(banner, _)| banner)
    }

    /// Whether a fatal error was reported.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Number of errors reported so far.
    #[must_use]
    pub fn reported(&self) -> u64 {
        self.reported
    }
}

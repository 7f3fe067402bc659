//! Inbound control vocabulary: orchestrator commands and local UI events.

use serde_json::Value;
use tracing::{debug, warn};
use whiskers_core::envelope::Envelope;
use whiskers_story::domain::notifications::ScrollDirection;

/// A command sent by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    ProceedChapter,
    /// Index as sent; range checks happen against the current chapter.
    MakeChoice { index: i64 },
    NavigateChoice { direction: ScrollDirection },
    ScrollUp,
    ScrollDown,
    MinigameInput { input: String },
    ResetGame,
}

impl RemoteCommand {
    /// Interprets an inbound envelope. Unknown types and missing or
    /// ill-typed fields are logged and yield `None`.
    #[must_use]
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        let command = match envelope.message_type.as_str() {
            "proceed_chapter" => Self::ProceedChapter,
            "make_choice" => {
                let index = required(envelope, "choiceIndex", Value::as_i64)?;
                Self::MakeChoice { index }
            }
            "navigate_choice" => {
                let direction = required(envelope, "direction", |v| match v.as_str() {
                    Some("up") => Some(ScrollDirection::Up),
                    Some("down") => Some(ScrollDirection::Down),
                    _ => None,
                })?;
                Self::NavigateChoice { direction }
            }
            "scroll_up" => Self::ScrollUp,
            "scroll_down" => Self::ScrollDown,
            "minigame_input" => {
                let input = required(envelope, "input", |v| v.as_str().map(str::to_owned))?;
                Self::MinigameInput { input }
            }
            "reset_game" => Self::ResetGame,
            other => {
                debug!(message_type = %other, "unknown message type");
                return None;
            }
        };
        Some(command)
    }

    /// Operation label used when reporting a failure of this command.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::ProceedChapter => "chapter_progression",
            Self::MakeChoice { .. } => "choice_processing",
            Self::NavigateChoice { .. } => "choice_navigation",
            Self::ScrollUp | Self::ScrollDown => "story_scroll",
            Self::MinigameInput { .. } => "minigame_input",
            Self::ResetGame => "game_reset",
        }
    }
}

fn required<T>(envelope: &Envelope, key: &str, read: impl FnOnce(&Value) -> Option<T>) -> Option<T> {
    let value = envelope.field(key).and_then(read);
    if value.is_none() {
        warn!(message_type = %envelope.message_type, field = key, "missing or invalid field, ignoring message");
    }
    value
}

/// An event raised by the local presentation surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    /// Same effect as the orchestrator command.
    Command(RemoteCommand),
    /// Take the choice under the cursor.
    SelectCurrent,
    PageHidden,
    PageVisible,
    /// Development only.
    JumpToChapter(String),
    Shutdown,
}

impl LocalEvent {
    /// Maps a line of keyboard input to an event.
    ///
    /// `up`/`down` navigate, `enter` selects, `space` proceeds, a digit picks
    /// a choice by number (1-based), `reset`, `hide`, `show`, `jump <id>` and
    /// `quit` do what they say.
    #[must_use]
    pub fn from_key_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let event = match line {
            "up" | "k" => Self::Command(RemoteCommand::NavigateChoice {
                direction: ScrollDirection::Up,
            }),
            "down" | "j" => Self::Command(RemoteCommand::NavigateChoice {
                direction: ScrollDirection::Down,
            }),
            "" | "enter" => Self::SelectCurrent,
            "space" | "proceed" => Self::Command(RemoteCommand::ProceedChapter),
            "pgup" => Self::Command(RemoteCommand::ScrollUp),
            "pgdn" => Self::Command(RemoteCommand::ScrollDown),
            "reset" => Self::Command(RemoteCommand::ResetGame),
            "hide" => Self::PageHidden,
            "show" => Self::PageVisible,
            "quit" | "q" => Self::Shutdown,
            other => {
                if let Some(id) = other.strip_prefix("jump ") {
                    Self::JumpToChapter(id.trim().to_owned())
                } else if let Ok(number) = other.parse::<i64>() {
                    let index = number.checked_sub(1)?;
                    Self::Command(RemoteCommand::MakeChoice { index })
                } else {
                    return None;
                }
            }
        };
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> Envelope {
        Envelope::from_tagged(value).unwrap()
    }

    #[test]
    fn test_make_choice_reads_index() {
        // Arrange
        let message = envelope(json!({"type": "make_choice", "choiceIndex": 1}));

        // Act
        let command = RemoteCommand::from_envelope(&message);

        // Assert
        assert_eq!(command, Some(RemoteCommand::MakeChoice { index: 1 }));
    }

    #[test]
    fn test_negative_index_is_passed_through() {
        let message = envelope(json!({"type": "make_choice", "choiceIndex": -1}));

        assert_eq!(
            RemoteCommand::from_envelope(&message),
            Some(RemoteCommand::MakeChoice { index: -1 })
        );
    }

    #[test]
    fn test_ill_typed_index_is_ignored() {
        let message = envelope(json!({"type": "make_choice", "choiceIndex": "1"}));

        assert_eq!(RemoteCommand::from_envelope(&message), None);
    }

    #[test]
    fn test_navigate_requires_known_direction() {
        let up = envelope(json!({"type": "navigate_choice", "direction": "up"}));
        let sideways = envelope(json!({"type": "navigate_choice", "direction": "left"}));

        assert_eq!(
            RemoteCommand::from_envelope(&up),
            Some(RemoteCommand::NavigateChoice {
                direction: ScrollDirection::Up
            })
        );
        assert_eq!(RemoteCommand::from_envelope(&sideways), None);
    }

    #[test]
    fn test_minigame_input_requires_input() {
        let message = envelope(json!({"type": "minigame_input"}));

        assert_eq!(RemoteCommand::from_envelope(&message), None);
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let message = envelope(json!({"type": "dance"}));

        assert_eq!(RemoteCommand::from_envelope(&message), None);
    }

    #[test]
    fn test_key_lines() {
        assert_eq!(LocalEvent::from_key_line("enter"), Some(LocalEvent::SelectCurrent));
        assert_eq!(
            LocalEvent::from_key_line("2"),
            Some(LocalEvent::Command(RemoteCommand::MakeChoice { index: 1 }))
        );
        assert_eq!(
            LocalEvent::from_key_line("jump hero_ending"),
            Some(LocalEvent::JumpToChapter("hero_ending".to_owned()))
        );
        assert_eq!(LocalEvent::from_key_line("q"), Some(LocalEvent::Shutdown));
        assert_eq!(LocalEvent::from_key_line("dance"), None);
        assert_eq!(LocalEvent::from_key_line(&i64::MIN.to_string()), None);
    }

    #[test]
    fn test_smallest_choice_number_is_rejected_without_overflow() {
        let line = "-9223372036854775808";

        let event = LocalEvent::from_key_line(line);

        assert_eq!(event, None);
        assert_eq!(
            LocalEvent::from_key_line("-9223372036854775807"),
            Some(LocalEvent::Command(RemoteCommand::MakeChoice { index: i64::MIN }))
        );
    }
}

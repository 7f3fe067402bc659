//! Story content loading.

use std::path::Path;

use tracing::info;
use whiskers_story::domain::chapter::StoryBook;

use crate::error::AppError;

/// The story shipped with the binary.
pub const EMBEDDED_STORY: &str = include_str!("../assets/story.json");

/// Loads the story from `path`, or the embedded story when `path` is `None`.
/// Files ending in `.yaml` or `.yml` are parsed as YAML, anything else as JSON.
///
/// # Errors
///
/// Returns `AppError::StoryFile` if the file cannot be read and
/// `AppError::Story` if its content is invalid.
pub fn load_story(path: Option<&Path>) -> Result<StoryBook, AppError> {
    let Some(path) = path else {
        let book = StoryBook::from_json(EMBEDDED_STORY)?;
        info!(chapters = book.len(), version = %book.version_hash(), "loaded embedded story");
        return Ok(book);
    };
    let source = std::fs::read_to_string(path).map_err(|source| AppError::StoryFile {
        path: path.display().to_string(),
        source,
    })?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    let book = if is_yaml {
        StoryBook::from_yaml(&source)?
    } else {
        StoryBook::from_json(&source)?
    };
    info!(path = %path.display(), chapters = book.len(), version = %book.version_hash(), "loaded story");
    Ok(book)
}

//! Static story content: chapters, choices and the validated story book.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;
use whiskers_core::error::ContentError;

use super::stats::StatPatch;

/// Id of the chapter every playthrough starts from.
pub const START_CHAPTER: &str = "start";

/// How a chapter is presented and how the engine proceeds from it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChapterType {
    /// Plain narrative with choices or an automatic continuation.
    #[default]
    Story,
    /// A terminal chapter; only a restart is offered.
    Ending,
    /// A chapter played out as a minigame.
    Minigame,
    /// A chapter built around its narration.
    AudioFocus,
}

impl ChapterType {
    /// Wire name of the type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Ending => "ending",
            Self::Minigame => "minigame",
            Self::AudioFocus => "audio_focus",
        }
    }
}

/// An edge from one chapter to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    /// Label shown to the player.
    pub text: String,
    /// Target chapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_chapter: Option<String>,
    /// Stat patch applied when the choice is taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<StatPatch>,
}

/// A node in the story graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: ChapterType,
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Stat patch applied on entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<StatPatch>,
    /// Automatic continuation when there are no choices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minigame_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_type: Option<String>,
}

impl Chapter {
    /// More than one choice: a real decision rather than a continue action.
    #[must_use]
    pub fn has_real_choices(&self) -> bool {
        self.choices.len() > 1
    }

    /// Minigame to run for this chapter: the explicit id, or `{id}_minigame`.
    #[must_use]
    pub fn resolved_minigame_id(&self) -> String {
        self.minigame_id
            .clone()
            .unwrap_or_else(|| format!("{}_minigame", self.id))
    }

    fn targets(&self) -> impl Iterator<Item = &str> {
        self.choices
            .iter()
            .filter_map(|c| c.next_chapter.as_deref())
            .chain(self.next_chapter.as_deref())
    }
}

/// The validated, immutable chapter table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryBook {
    chapters: BTreeMap<String, Chapter>,
    version_hash: String,
}

impl StoryBook {
    /// Parses a story from JSON keyed by chapter id.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::InvalidStory` if the JSON does not parse or the
    /// story fails validation.
    pub fn from_json(source: &str) -> Result<Self, ContentError> {
        let chapters: BTreeMap<String, Chapter> = serde_json::from_str(source)
            .map_err(|e| ContentError::InvalidStory(format!("story JSON: {e}")))?;
        Self::build(chapters)
    }

    /// Parses a story from YAML keyed by chapter id.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::InvalidStory` if the YAML does not parse or the
    /// story fails validation.
    pub fn from_yaml(source: &str) -> Result<Self, ContentError> {
        let chapters: BTreeMap<String, Chapter> = serde_yaml::from_str(source)
            .map_err(|e| ContentError::InvalidStory(format!("story YAML: {e}")))?;
        Self::build(chapters)
    }

    /// Builds a story from chapters, keyed by their ids.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::InvalidStory` if two chapters share an id or
    /// the story fails validation.
    pub fn from_chapters(chapters: impl IntoIterator<Item = Chapter>) -> Result<Self, ContentError> {
        let mut table = BTreeMap::new();
        for chapter in chapters {
            if let Some(dup) = table.insert(chapter.id.clone(), chapter) {
                return Err(ContentError::InvalidStory(format!(
                    "duplicate chapter id: {}",
                    dup.id
                )));
            }
        }
        Self::build(table)
    }

    fn build(chapters: BTreeMap<String, Chapter>) -> Result<Self, ContentError> {
        validate(&chapters)?;
        // BTreeMap order makes the canonical form independent of source format.
        let canonical =
            serde_json::to_vec(&chapters).map_err(|e| ContentError::InvalidStory(e.to_string()))?;
        let version_hash = format!("{:x}", Sha256::digest(&canonical));
        Ok(Self {
            chapters,
            version_hash,
        })
    }

    /// Looks a chapter up by id.
    #[must_use]
    pub fn chapter(&self, id: &str) -> Option<&Chapter> {
        self.chapters.get(id)
    }

    /// Every chapter id, sorted.
    #[must_use]
    pub fn chapter_ids(&self) -> Vec<&str> {
        self.chapters.keys().map(String::as_str).collect()
    }

    /// The distinct chapter types used by the story.
    #[must_use]
    pub fn chapter_types(&self) -> BTreeSet<ChapterType> {
        self.chapters.values().map(|c| c.kind).collect()
    }

    /// Whether `from` links directly to `to`, through a choice or its
    /// automatic continuation. False if either chapter is unknown.
    #[must_use]
    pub fn links_to(&self, from: &str, to: &str) -> bool {
        match (self.chapters.get(from), self.chapters.contains_key(to)) {
            (Some(chapter), true) => chapter.targets().any(|target| target == to),
            _ => false,
        }
    }

    /// Number of chapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    /// Whether the story has no chapters. A validated story never does.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// SHA-256 of the canonical story, hex encoded.
    #[must_use]
    pub fn version_hash(&self) -> &str {
        &self.version_hash
    }
}

fn validate(chapters: &BTreeMap<String, Chapter>) -> Result<(), ContentError> {
    if !chapters.contains_key(START_CHAPTER) {
        return Err(ContentError::InvalidStory(format!(
            "required chapter missing: {START_CHAPTER}"
        )));
    }
    for (key, chapter) in chapters {
        if chapter.id.trim().is_empty()
            || chapter.title.trim().is_empty()
            || chapter.text.trim().is_empty()
        {
            return Err(ContentError::InvalidStory(format!(
                "invalid chapter structure: {key}"
            )));
        }
        if *key != chapter.id {
            return Err(ContentError::InvalidStory(format!(
                "chapter key {key} does not match id {}",
                chapter.id
            )));
        }
        for target in chapter.targets().filter(|t| !chapters.contains_key(*t)) {
            warn!(chapter = %key, target = %target, "chapter links to a missing chapter");
        }
    }
    Ok(())
}

//! Player stats and the typed effect patch applied to them.

use serde::{Deserialize, Serialize};

/// Player attributes. Only ever changed through [`PlayerStats::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    /// Hit points.
    pub health: i32,
    /// Courage level, e.g. `"Normal"` or `"Brave"`.
    pub courage: String,
    /// Where the player currently is.
    pub location: String,
    /// Whether the bubble powers were picked up.
    pub has_bubble_powers: bool,
    /// Whether an ally joined.
    pub has_ally: bool,
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self {
            health: 100,
            courage: "Normal".to_owned(),
            location: "Home".to_owned(),
            has_bubble_powers: false,
            has_ally: false,
        }
    }
}

/// A partial stat update attached to a chapter or a choice.
///
/// Keys outside the stat schema fail to parse, so authoring typos surface when
/// the story is loaded rather than being dropped during play.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_bubble_powers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_ally: Option<bool>,
}

impl StatPatch {
    /// Whether the patch sets nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl PlayerStats {
    /// Overwrites every field the patch sets. Returns the names of the fields
    /// that were touched, for logging.
    pub fn apply(&mut self, patch: &StatPatch) -> Vec<&'static str> {
        let mut touched = Vec::new();
        if let Some(health) = patch.health {
            self.health = health;
            touched.push("health");
        }
        if let Some(courage) = &patch.courage {
            self.courage.clone_from(courage);
            touched.push("courage");
        }
        if let Some(location) = &patch.location {
            self.location.clone_from(location);
            touched.push("location");
        }
        if let Some(flag) = patch.has_bubble_powers {
            self.has_bubble_powers = flag;
            touched.push("hasBubblePowers");
        }
        if let Some(flag) = patch.has_ally {
            self.has_ally = flag;
            touched.push("hasAlly");
        }
        touched
    }
}

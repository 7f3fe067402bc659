//! Feature toggles recognised by every component.

use serde::Serialize;

/// Runtime feature switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureToggles {
    /// Connect to the publish/subscribe broker.
    pub mqtt: bool,
    /// Trigger chapter narration when a chapter is entered.
    pub audio: bool,
    /// Run minigames for minigame chapters instead of skipping past them.
    pub minigames: bool,
    /// Enable development-only operations (chapter jumps, status surface).
    pub development_mode: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            mqtt: true,
            audio: false,
            minigames: true,
            development_mode: true,
        }
    }
}

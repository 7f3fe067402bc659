//! Audio and minigame side channels.
//!
//! Each adapter runs its work in a spawned task and reports progress as
//! [`SideChannelSignal`]s on a shared channel. Real backends are optional;
//! without one, or when one fails, a placeholder simulation runs instead so
//! the story can continue.

pub mod audio;
pub mod minigame;

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use whiskers_core::clock::Clock;
use whiskers_core::rng::DeterministicRng;
use whiskers_core::signal::SideChannelSignal;

pub use audio::{AudioAdapter, AudioBackend, AudioConfig, AudioStats};
pub use minigame::{MinigameAdapter, MinigameConfig, MinigameHost, MinigameSession, MinigameStats};

/// Both adapters plus the receiving end of their signal channel.
pub struct SideChannels {
    pub audio: AudioAdapter,
    pub minigame: MinigameAdapter,
    pub signals: UnboundedReceiver<SideChannelSignal>,
}

impl std::fmt::Debug for SideChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideChannels")
            .field("audio", &self.audio)
            .field("minigame", &self.minigame)
            .finish_non_exhaustive()
    }
}

impl SideChannels {
    /// Creates both adapters sharing one signal channel.
    #[must_use]
    pub fn new(
        audio: AudioConfig,
        minigame: MinigameConfig,
        clock: Arc<dyn Clock>,
        audio_rng: Box<dyn DeterministicRng>,
        minigame_rng: Box<dyn DeterministicRng>,
    ) -> Self {
        let (sender, signals) = mpsc::unbounded_channel();
        Self {
            audio: AudioAdapter::new(audio, sender.clone(), Arc::clone(&clock), audio_rng),
            minigame: MinigameAdapter::new(minigame, sender, clock, minigame_rng),
            signals,
        }
    }
}

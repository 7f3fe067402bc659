//! Chapter narration.
//!
//! One playback at a time. A playback runs in its own task and reports
//! `loading`, `started`, `paused`, `finished` (and `blocked`/`error` when the
//! backend refuses) for the task id the story engine issued. Without a
//! backend the narration is simulated for a configured or random duration.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use whiskers_core::clock::{Clock, iso_timestamp};
use whiskers_core::error::SideChannelError;
use whiskers_core::rng::DeterministicRng;
use whiskers_core::signal::{AudioStatus, SideChannelSignal, TaskId};

const HISTORY_LIMIT: usize = 20;
const PLACEHOLDER_MIN_MS: u32 = 15_000;
const PLACEHOLDER_MAX_MS: u32 = 45_000;

/// Plays audio files.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Loads and starts `path`, returning how long it will play.
    ///
    /// # Errors
    ///
    /// `SideChannelError::Blocked` when playback needs user interaction;
    /// any other variant when the file cannot be loaded or played.
    async fn start(&self, path: &str) -> Result<Duration, SideChannelError>;
}

/// Audio adapter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    /// Directory prefix for narration files.
    pub base_path: String,
    /// Fixed placeholder duration; random 15–45 s when unset.
    pub mock_delay: Option<Duration>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            base_path: "./audio/".to_owned(),
            mock_delay: None,
        }
    }
}

/// A finished playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioHistoryEntry {
    pub file: String,
    pub timestamp: String,
}

/// Diagnostics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioStats {
    pub current_file: Option<String>,
    pub paused: bool,
    pub history: Vec<AudioHistoryEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Pause,
    Resume,
}

#[derive(Debug)]
struct Playback {
    task: TaskId,
    file: String,
    paused: bool,
    control: UnboundedSender<Control>,
    handle: JoinHandle<()>,
}

/// Audio side channel.
pub struct AudioAdapter {
    config: AudioConfig,
    backend: Option<Arc<dyn AudioBackend>>,
    signals: UnboundedSender<SideChannelSignal>,
    clock: Arc<dyn Clock>,
    rng: Box<dyn DeterministicRng>,
    current: Option<Playback>,
    history: VecDeque<AudioHistoryEntry>,
}

impl std::fmt::Debug for AudioAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioAdapter")
            .field("config", &self.config)
            .field("has_backend", &self.backend.is_some())
            .field("current", &self.current.as_ref().map(|p| &p.file))
            .finish_non_exhaustive()
    }
}

/// File name of a chapter's narration.
#[must_use]
pub fn chapter_audio_file(chapter_id: &str) -> String {
    format!("chapter_{chapter_id}_main.mp3")
}

impl AudioAdapter {
    /// Creates an adapter that simulates playback.
    #[must_use]
    pub fn new(
        config: AudioConfig,
        signals: UnboundedSender<SideChannelSignal>,
        clock: Arc<dyn Clock>,
        rng: Box<dyn DeterministicRng>,
    ) -> Self {
        Self {
            config,
            backend: None,
            signals,
            clock,
            rng,
            current: None,
            history: VecDeque::new(),
        }
    }

    /// Plays through `backend`, falling back to simulation when it fails.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn AudioBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Starts the narration of a chapter, stopping whatever was playing.
    /// Must be called inside a tokio runtime.
    pub fn play_chapter(&mut self, task: TaskId, chapter_id: &str) {
        self.stop();
        let file = chapter_audio_file(chapter_id);
        let path = format!("{}{file}", self.config.base_path);
        let fallback = self.config.mock_delay.unwrap_or_else(|| {
            Duration::from_millis(u64::from(
                self.rng
                    .next_u32_range(PLACEHOLDER_MIN_MS, PLACEHOLDER_MAX_MS),
            ))
        });
        info!(%task, file = %file, "playing chapter audio");

        let (control, control_rx) = mpsc::unbounded_channel();
        let run = PlaybackRun {
            task,
            file: file.clone(),
            path,
            fallback,
            backend: self.backend.clone(),
            signals: self.signals.clone(),
        };
        let handle = tokio::spawn(run.run(control_rx));
        self.current = Some(Playback {
            task,
            file,
            paused: false,
            control,
            handle,
        });
    }

    /// Stops the current playback. Returns the file that was stopped.
    pub fn stop(&mut self) -> Option<String> {
        let playback = self.current.take()?;
        playback.handle.abort();
        debug!(task = %playback.task, file = %playback.file, "audio stopped");
        Some(playback.file)
    }

    /// Pauses the current playback. Returns whether anything was paused.
    pub fn pause(&mut self) -> bool {
        match self.current.as_mut() {
            Some(playback) if !playback.paused => {
                playback.paused = playback.control.send(Control::Pause).is_ok();
                playback.paused
            }
            _ => false,
        }
    }

    /// Resumes a paused playback. Returns whether anything was resumed.
    pub fn resume(&mut self) -> bool {
        match self.current.as_mut() {
            Some(playback) if playback.paused => {
                playback.paused = false;
                playback.control.send(Control::Resume).is_ok()
            }
            _ => false,
        }
    }

    /// Updates bookkeeping from a signal this adapter emitted.
    pub fn observe(&mut self, signal: &SideChannelSignal) {
        let SideChannelSignal::Audio { task, status, .. } = signal else {
            return;
        };
        if *status != AudioStatus::Finished {
            return;
        }
        if let Some(playback) = self.current.take_if(|p| p.task == *task) {
            self.history.push_front(AudioHistoryEntry {
                file: playback.file,
                timestamp: iso_timestamp(self.clock.now()),
            });
            self.history.truncate(HISTORY_LIMIT);
        }
    }

    /// Whether a playback is in progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Diagnostics snapshot.
    #[must_use]
    pub fn stats(&self) -> AudioStats {
        AudioStats {
            current_file: self.current.as_ref().map(|p| p.file.clone()),
            paused: self.current.as_ref().is_some_and(|p| p.paused),
            history: self.history.iter().cloned().collect(),
        }
    }
}

struct PlaybackRun {
    task: TaskId,
    file: String,
    path: String,
    fallback: Duration,
    backend: Option<Arc<dyn AudioBackend>>,
    signals: UnboundedSender<SideChannelSignal>,
}

impl PlaybackRun {
    fn emit(&self, status: AudioStatus) {
        let _ = self.signals.send(SideChannelSignal::Audio {
            task: self.task,
            file: self.file.clone(),
            status,
        });
    }

    async fn run(self, mut control: UnboundedReceiver<Control>) {
        self.emit(AudioStatus::Loading);
        let duration = match &self.backend {
            Some(backend) => match backend.start(&self.path).await {
                Ok(duration) => duration,
                Err(SideChannelError::Blocked(_)) => {
                    warn!(file = %self.file, "audio blocked, using placeholder");
                    self.emit(AudioStatus::Blocked);
                    self.fallback
                }
                Err(e) => {
                    warn!(file = %self.file, error = %e, "audio failed, using placeholder");
                    self.emit(AudioStatus::Error);
                    self.fallback
                }
            },
            None => {
                debug!(file = %self.file, ms = self.fallback.as_millis(), "placeholder playback");
                self.fallback
            }
        };

        self.emit(AudioStatus::Started);
        let mut remaining = duration;
        loop {
            let segment_start = Instant::now();
            tokio::select! {
                () = sleep(remaining) => break,
                command = control.recv() => {
                    remaining = remaining.saturating_sub(segment_start.elapsed());
                    match command {
                        Some(Control::Pause) => {
                            self.emit(AudioStatus::Paused);
                            if !wait_for_resume(&mut control).await {
                                return;
                            }
                            self.emit(AudioStatus::Started);
                        }
                        Some(Control::Resume) => {}
                        None => return,
                    }
                }
            }
        }
        self.emit(AudioStatus::Finished);
    }
}

async fn wait_for_resume(control: &mut UnboundedReceiver<Control>) -> bool {
    loop {
        match control.recv().await {
            Some(Control::Resume) => return true,
            Some(Control::Pause) => {}
            None => return false,
        }
    }
}
